//! Function-calling tier: the tool set offered to the model and the
//! responder that runs one tool call per turn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use pizzabot_core::cart::MAX_ITEM_QUANTITY;
use pizzabot_core::domain::session::SessionState;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, ToolChoice, ToolSpec};
use crate::retrieval::RetrievalFallback;
use crate::services::{DialogueServices, TurnContext};

pub const TOOL_FOLLOW_UP_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

/// What a tool may touch while it runs.
pub struct ToolInvocation<'a> {
    pub turn: &'a TurnContext,
    pub state: &'a mut SessionState,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    async fn execute(
        &self,
        arguments: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    /// The standard tool set, in the order it is offered to the model.
    pub fn standard(services: Arc<DialogueServices>, retrieval: Arc<RetrievalFallback>) -> Self {
        let mut registry = Self::default();
        registry.register(ShowMenuTool { services: services.clone() });
        registry.register(GetInfoTool { services: services.clone() });
        registry.register(AddToCartTool { services: services.clone() });
        registry.register(RemoveFromCartTool { services: services.clone() });
        registry.register(CheckoutTool { services: services.clone() });
        registry.register(TrackOrderTool { services: services.clone() });
        registry.register(RagFallbackTool { services, retrieval });
        registry
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn no_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

fn item_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "item": {"type": "string"},
            "quantity": {"type": "integer", "minimum": 1, "maximum": MAX_ITEM_QUANTITY}
        },
        "required": ["item"]
    })
}

#[derive(Deserialize)]
struct ItemArguments {
    item: String,
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

fn item_arguments(tool: &'static str, arguments: Value) -> Result<(String, u32), ToolError> {
    let parsed: ItemArguments = serde_json::from_value(arguments)
        .map_err(|error| ToolError::InvalidArguments { tool, reason: error.to_string() })?;
    let item = parsed.item.trim().to_string();
    if item.is_empty() {
        return Err(ToolError::InvalidArguments { tool, reason: "item must be named".to_string() });
    }
    if !(1..=MAX_ITEM_QUANTITY).contains(&parsed.quantity) {
        return Err(ToolError::InvalidArguments {
            tool,
            reason: format!("quantity must be between 1 and {MAX_ITEM_QUANTITY}"),
        });
    }
    Ok((item, parsed.quantity))
}

struct ShowMenuTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for ShowMenuTool {
    fn name(&self) -> &'static str {
        "show_menu"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Mostra il menu completo della pizzeria".into(),
            parameters: no_parameters(),
        }
    }

    async fn execute(&self, _: Value, _: &mut ToolInvocation<'_>) -> Result<String, ToolError> {
        Ok(self.services.replies.format_menu(&self.services.catalog))
    }
}

struct GetInfoTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for GetInfoTool {
    fn name(&self) -> &'static str {
        "get_info"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Indirizzo, orari e telefono della pizzeria".into(),
            parameters: no_parameters(),
        }
    }

    async fn execute(&self, _: Value, _: &mut ToolInvocation<'_>) -> Result<String, ToolError> {
        Ok(self.services.replies.info())
    }
}

struct AddToCartTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for AddToCartTool {
    fn name(&self) -> &'static str {
        "add_to_cart"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Aggiunge un prodotto del menu al carrello".into(),
            parameters: item_parameters(),
        }
    }

    async fn execute(
        &self,
        arguments: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError> {
        let request = item_arguments(self.name(), arguments)?;
        let cart = &mut invocation.state.cart;
        let outcome = self.services.add_items(cart, std::slice::from_ref(&request));
        if outcome.added.is_empty() {
            return Ok(self.services.replies.not_in_menu(&request.0));
        }
        Ok(self.services.confirm_added(cart, &outcome.added))
    }
}

struct RemoveFromCartTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for RemoveFromCartTool {
    fn name(&self) -> &'static str {
        "remove_from_cart"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Rimuove un prodotto dal carrello".into(),
            parameters: item_parameters(),
        }
    }

    async fn execute(
        &self,
        arguments: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError> {
        let request = item_arguments(self.name(), arguments)?;
        let cart = &mut invocation.state.cart;
        let outcome = self.services.remove_items(cart, std::slice::from_ref(&request));
        Ok(self.services.removal_fragments(cart, &outcome).join("\n\n"))
    }
}

struct CheckoutTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for CheckoutTool {
    fn name(&self) -> &'static str {
        "checkout"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Conclude l'ordine con il contenuto del carrello".into(),
            parameters: no_parameters(),
        }
    }

    async fn execute(
        &self,
        _: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError> {
        Ok(self.services.checkout_reply(invocation.turn, invocation.state).await)
    }
}

struct TrackOrderTool {
    services: Arc<DialogueServices>,
}

#[async_trait]
impl Tool for TrackOrderTool {
    fn name(&self) -> &'static str {
        "track_order"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Stato e orario di ritiro dell'ultimo ordine".into(),
            parameters: no_parameters(),
        }
    }

    async fn execute(
        &self,
        _: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError> {
        Ok(self.services.replies.track(invocation.state.last_order.as_ref()))
    }
}

struct RagFallbackTool {
    services: Arc<DialogueServices>,
    retrieval: Arc<RetrievalFallback>,
}

#[derive(Deserialize)]
struct QueryArguments {
    query: String,
}

#[async_trait]
impl Tool for RagFallbackTool {
    fn name(&self) -> &'static str {
        "rag_fallback"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().into(),
            description: "Risponde a domande generali usando la base di conoscenza".into(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: Value,
        invocation: &mut ToolInvocation<'_>,
    ) -> Result<String, ToolError> {
        let QueryArguments { query } = serde_json::from_value(arguments).map_err(|error| {
            ToolError::InvalidArguments { tool: "rag_fallback", reason: error.to_string() }
        })?;
        let history = invocation.state.history_before(&query, usize::MAX);
        Ok(self
            .retrieval
            .answer(&query, history)
            .await
            .unwrap_or_else(|| self.services.replies.not_understood()))
    }
}

/// Second tier of the fallback chain. Offers the tool set to the model and,
/// when it declines to call one, defers to retrieval.
pub struct FallbackResponder {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    retrieval: Arc<RetrievalFallback>,
    services: Arc<DialogueServices>,
    history_turns: usize,
}

impl FallbackResponder {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        retrieval: Arc<RetrievalFallback>,
        services: Arc<DialogueServices>,
    ) -> Self {
        Self { llm, registry, retrieval, services, history_turns: 6 }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// `None` when neither the tools nor retrieval produced an answer.
    pub async fn respond(
        &self,
        text: &str,
        invocation: &mut ToolInvocation<'_>,
    ) -> Option<String> {
        let system = format!(
            "Sei Mario, assistente di {}. Usa le funzioni disponibili per aiutare l'utente.",
            self.services.replies.restaurant().name
        );
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(
            invocation.state.history_before(text, self.history_turns).iter().map(ChatMessage::from),
        );
        messages.push(ChatMessage::user(text));

        let request = ChatRequest::new(messages.clone())
            .with_tools(self.registry.specs(), ToolChoice::Auto);
        let reply = match self.llm.chat(request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "dialogue.fallback.tier_failed",
                    tier = "function_calling",
                    correlation_id = %invocation.turn.correlation_id(),
                    error = %error,
                    "function calling failed, trying retrieval"
                );
                return self.retrieve(text, invocation).await;
            }
        };

        let Some(call) = reply.tool_calls.into_iter().next() else {
            debug!(event_name = "dialogue.fallback.no_tool_call", "model declined the tools");
            return self.retrieve(text, invocation).await;
        };

        let result = match self.registry.get(&call.name) {
            Some(tool) => {
                let arguments = serde_json::from_str::<Value>(&call.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                match tool.execute(arguments, invocation).await {
                    Ok(result) => result,
                    Err(error) => {
                        warn!(
                            event_name = "dialogue.fallback.tool_rejected",
                            tool = %call.name,
                            error = %error,
                            "tool arguments rejected"
                        );
                        error.to_string()
                    }
                }
            }
            None => self.services.replies.unknown_function(&call.name),
        };
        info!(
            event_name = "dialogue.fallback.tool_called",
            tool = %call.name,
            session_id = %invocation.turn.session_id,
            "tool executed"
        );

        let call_id = call.id.clone();
        messages.push(ChatMessage::assistant_tool_calls(vec![call]));
        messages.push(ChatMessage::tool_result(
            call_id,
            serde_json::to_string(&result).unwrap_or_else(|_| result.clone()),
        ));

        let follow_up = ChatRequest::new(messages).with_temperature(TOOL_FOLLOW_UP_TEMPERATURE);
        match self.llm.chat(follow_up).await {
            Ok(reply) => Some(reply.trimmed_text().unwrap_or(result)),
            Err(error) => {
                warn!(
                    event_name = "dialogue.fallback.follow_up_failed",
                    error = %error,
                    "returning the raw tool result"
                );
                Some(result)
            }
        }
    }

    async fn retrieve(&self, text: &str, invocation: &ToolInvocation<'_>) -> Option<String> {
        let history = invocation.state.history_before(text, usize::MAX);
        self.retrieval.answer(text, history).await
    }
}
