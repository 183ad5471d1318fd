//! OpenAI-compatible HTTP client.
//!
//! Speaks `/chat/completions` and `/embeddings`. Ollama exposes the same
//! surface under `<base>/v1`, so both providers share this client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pizzabot_core::config::{LlmConfig, LlmProvider};

use crate::llm::{
    ChatMessage, ChatReply, ChatRequest, EmbeddingClient, LlmClient, LlmError, Role, ToolCall,
    ToolChoice,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const BACKOFF_STEP: Duration = Duration::from_millis(250);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    embedding_model: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match config.provider {
            LlmProvider::Disabled => return Err(LlmError::Disabled),
            LlmProvider::OpenAi => {
                config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            }
            LlmProvider::Ollama => {
                let base = config.base_url.clone().ok_or_else(|| LlmError::Transport {
                    message: "ollama provider requires a base url".to_string(),
                    retryable: false,
                })?;
                ollama_endpoint(&base)
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport {
                message: format!("could not build http client: {error}"),
                retryable: false,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            match self.send_once(&url, body).await {
                Ok(parsed) => return Ok(parsed),
                Err(failure) if failure.error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = failure
                        .retry_after
                        .map(|delay| delay.min(MAX_RETRY_AFTER))
                        .unwrap_or(BACKOFF_STEP * attempt);
                    warn!(
                        event_name = "llm.request_retry",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn send_once<B, R>(&self, url: &str, body: &B) -> Result<R, SendFailure>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(url).header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = request.json(body).send().await.map_err(|err| SendFailure {
            error: LlmError::Transport {
                message: format!("model request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            },
            retry_after: None,
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read model error body".to_string());
            return Err(SendFailure { error: map_http_error(status, body_text), retry_after });
        }

        response.json::<R>().await.map_err(|err| SendFailure {
            error: LlmError::Decode(err.to_string()),
            retry_after: None,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError> {
        let body = ChatCompletionRequest::new(&self.model, &request);
        debug!(
            event_name = "llm.chat_request",
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion"
        );
        let parsed: ChatCompletionResponse = self.post_json("chat/completions", &body).await?;
        extract_reply(parsed)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest { model: &self.embedding_model, input: text };
        let parsed: EmbeddingResponse = self.post_json("embeddings", &body).await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(LlmError::Empty)
    }
}

fn ollama_endpoint(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

struct SendFailure {
    error: LlmError,
    retry_after: Option<Duration>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(model: &'a str, request: &'a ChatRequest) -> Self {
        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            tools: request
                .tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: WireToolSpec {
                        name: &spec.name,
                        description: &spec.description,
                        parameters: &spec.parameters,
                    },
                })
                .collect(),
            tool_choice: request.tool_choice.map(|choice| match choice {
                ToolChoice::Auto => "auto",
                ToolChoice::None => "none",
            }),
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            },
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall { name: &call.name, arguments: &call.arguments },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolSpec<'a>,
}

#[derive(Serialize)]
struct WireToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    /// OpenAI sends a JSON string, Ollama an object.
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_reply(response: ChatCompletionResponse) -> Result<ChatReply, LlmError> {
    let message = response.choices.into_iter().next().ok_or(LlmError::Empty)?.message;
    let tool_calls = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() { format!("call_{index}") } else { call.id },
            name: call.function.name,
            arguments: match call.function.arguments {
                serde_json::Value::String(raw) => raw,
                serde_json::Value::Null => "{}".to_string(),
                other => other.to_string(),
            },
        })
        .collect::<Vec<_>>();

    if message.content.is_none() && tool_calls.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(ChatReply { content: message.content, tool_calls })
}

fn map_http_error(status: StatusCode, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    LlmError::Http { status: status.as_u16(), message, retryable }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
