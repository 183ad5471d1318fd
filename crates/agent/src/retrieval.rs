use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use pizzabot_core::domain::session::ChatTurn;

use crate::llm::{ChatMessage, ChatRequest, EmbeddingClient, LlmClient};

pub const RETRIEVAL_TEMPERATURE: f32 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub struct KnowledgeDocument {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Knowledge documents with their embeddings, computed once at startup.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeIndex {
    documents: Vec<KnowledgeDocument>,
}

impl KnowledgeIndex {
    pub fn from_documents(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    /// `(file name, contents)` of every `.txt` file in `dir`, sorted by name.
    /// A missing directory is an empty knowledge base.
    pub async fn read_documents(dir: &Path) -> std::io::Result<Vec<(String, String)>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    event_name = "retrieval.documents_missing",
                    dir = %dir.display(),
                    "knowledge document directory not found"
                );
                return Ok(Vec::new());
            }
            Err(error) => return Err(error),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            let id = entry.file_name().to_string_lossy().into_owned();
            documents.push((id, text));
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }

    /// Embeds every document; ones the endpoint rejects are left out.
    pub async fn build(documents: Vec<(String, String)>, embedder: &dyn EmbeddingClient) -> Self {
        let mut indexed = Vec::with_capacity(documents.len());
        for (id, text) in documents {
            match embedder.embed(&text).await {
                Ok(embedding) => indexed.push(KnowledgeDocument { id, text, embedding }),
                Err(error) => warn!(
                    event_name = "retrieval.embed_document_failed",
                    document = %id,
                    error = %error,
                    "skipping knowledge document"
                ),
            }
        }
        info!(event_name = "retrieval.index_built", documents = indexed.len(), "knowledge index ready");
        Self { documents: indexed }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The `k` most similar documents, best first. Equal scores keep index order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<&KnowledgeDocument> {
        let mut scored = self
            .documents
            .iter()
            .map(|document| (document, cosine_similarity(query, &document.embedding)))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(document, _)| document).collect()
    }
}

/// Zero when the vectors differ in length or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Last tier of the fallback chain: answer from the knowledge documents.
pub struct RetrievalFallback {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingClient>,
    index: KnowledgeIndex,
    restaurant_name: String,
    history_turns: usize,
    top_k: usize,
}

impl RetrievalFallback {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        index: KnowledgeIndex,
        restaurant_name: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            restaurant_name: restaurant_name.into(),
            history_turns: 10,
            top_k: 3,
        }
    }

    pub fn with_limits(mut self, history_turns: usize, top_k: usize) -> Self {
        self.history_turns = history_turns;
        self.top_k = top_k;
        self
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    async fn context_for(&self, text: &str) -> String {
        if self.index.is_empty() {
            return String::new();
        }
        match self.embedder.embed(text).await {
            Ok(query) => self
                .index
                .top_k(&query, self.top_k)
                .into_iter()
                .map(|document| document.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(error) => {
                warn!(
                    event_name = "retrieval.embed_query_failed",
                    error = %error,
                    "answering without knowledge context"
                );
                String::new()
            }
        }
    }

    /// `None` when the model cannot be reached or says nothing. `history`
    /// holds the turns before `text`.
    pub async fn answer(&self, text: &str, history: &[ChatTurn]) -> Option<String> {
        let context = self.context_for(text).await;
        let system = format!(
            "Sei Mario, un assistente virtuale per {}. Usa le seguenti informazioni se pertinenti \
             per rispondere:\n{context}",
            self.restaurant_name
        );

        let start = history.len().saturating_sub(self.history_turns);
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(history[start..].iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(text));

        let request = ChatRequest::new(messages).with_temperature(RETRIEVAL_TEMPERATURE);
        match self.llm.chat(request).await {
            Ok(reply) => {
                let answer = reply.trimmed_text();
                debug!(event_name = "retrieval.answered", answered = answer.is_some(), "rag reply");
                answer
            }
            Err(error) => {
                warn!(event_name = "retrieval.chat_failed", error = %error, "rag tier failed");
                None
            }
        }
    }
}
