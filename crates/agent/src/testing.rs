//! Shared fixtures and test doubles for the agent crate.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use pizzabot_core::catalog::MenuCatalog;

use crate::llm::{ChatReply, ChatRequest, EmbeddingClient, LlmClient, LlmError};
use crate::rules::KnowledgeBase;

pub const MENU_JSON: &str = r#"{
    "Pizze": [
        {"name": "Margherita", "price": 6.5, "aliases": ["marghe"]},
        {"name": "Diavola", "price": 8.0, "aliases": ["piccante"]},
        {"name": "Quattro Formaggi", "price": 9.0, "aliases": ["4 formaggi"]}
    ],
    "Bevande": [
        {"name": "Coca-Cola", "price": 2.5, "aliases": ["coca", "coke"]},
        {"name": "Acqua", "price": 1.0}
    ],
    "Dolci": [
        {"name": "Tiramisù", "price": 4.5, "aliases": ["tiramisu"]}
    ]
}"#;

pub const KB_JSON: &str = r#"[
    {"utterance": "ciao", "intent": "greet"},
    {"utterance": "fammi vedere il menu", "intent": "menu"},
    {"utterance": "vorrei ordinare", "intent": "order"},
    {"utterance": "aggiungi", "intent": "add_to_cart"},
    {"utterance": "togli", "intent": "remove"},
    {"utterance": "a che ora apri", "intent": "info"},
    {"utterance": "dov'è il mio ordine", "intent": "track"},
    {"utterance": "voglio pagare", "intent": "checkout"},
    {"utterance": "balla", "intent": "dance"},
    {
        "categories": {"pizze": ["pizza"], "bevande": ["bibita"]},
        "actions": {
            "menu": ["menu", "listino"],
            "order": ["vorrei", "prendo", "una ", "un "],
            "remove": ["rimuovi"],
            "checkout": ["checkout", "pagare", "basta così"],
            "info": ["orari", "indirizzo"],
            "track": ["ordine pronto"],
            "staff": ["operatore"]
        },
        "quantifiers": ["un", "una", "due"],
        "responses_template": {
            "greet": "Ciao da {{ pizzeria }}!"
        }
    }
]"#;

pub fn catalog() -> MenuCatalog {
    MenuCatalog::from_json(MENU_JSON).expect("fixture menu should parse")
}

pub fn knowledge_base() -> KnowledgeBase {
    KnowledgeBase::from_json(KB_JSON).expect("fixture knowledge base should parse")
}

/// Plays back queued replies in order and records every request it saw.
/// Runs dry with `LlmError::Empty`.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<ChatReply, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<ChatReply, LlmError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies.lock().expect("replies lock").pop_front().unwrap_or(Err(LlmError::Empty))
    }
}

/// One dimension per vocabulary word, set when the text mentions it.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: Vec<&'static str>) -> Self {
        Self { vocabulary }
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let lowered = text.to_lowercase();
        Ok(self
            .vocabulary
            .iter()
            .map(|word| if lowered.contains(word) { 1.0 } else { 0.0 })
            .collect())
    }
}
