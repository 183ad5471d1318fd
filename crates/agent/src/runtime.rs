//! The dialogue controller: checkout wizard first, then intent resolution,
//! then the fallback chain.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use pizzabot_core::audit::AuditSink;
use pizzabot_core::cart::MAX_ITEM_QUANTITY;
use pizzabot_core::catalog::{CatalogError, FuzzyMatcher, MenuCatalog};
use pizzabot_core::config::{AppConfig, IntentStrategy, LlmProvider};
use pizzabot_core::domain::intent::{IntentItem, IntentKind, ParsedIntent};
use pizzabot_core::domain::session::{DialogueStep, PendingOrder, SessionState};
use pizzabot_core::flows::{
    CheckoutWizard, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowTransitionError,
    WizardVocabulary,
};
use pizzabot_core::journal::{ChatLog, ChatLogEntry, OrderLog};

use crate::conversation::{HybridIntentResolver, IntentResolver, ModelIntentResolver};
use crate::llm::{DisabledLlm, EmbeddingClient, LlmClient, LlmError};
use crate::openai::OpenAiClient;
use crate::responses::ReplyBook;
use crate::retrieval::{KnowledgeIndex, RetrievalFallback};
use crate::rules::{KnowledgeBase, KnowledgeBaseError, RuleIntentResolver};
use crate::services::{DialogueServices, TurnContext};
use crate::tools::{FallbackResponder, ToolInvocation, ToolRegistry};

const FRAGMENT_SEPARATOR: &str = "\n\n";

pub struct DialogueController {
    services: Arc<DialogueServices>,
    engine: FlowEngine<CheckoutWizard>,
    vocabulary: WizardVocabulary,
    resolver: Arc<dyn IntentResolver>,
    fallback: FallbackResponder,
    chat_log: Arc<dyn ChatLog>,
}

impl DialogueController {
    pub fn new(
        services: Arc<DialogueServices>,
        vocabulary: WizardVocabulary,
        resolver: Arc<dyn IntentResolver>,
        fallback: FallbackResponder,
        chat_log: Arc<dyn ChatLog>,
    ) -> Self {
        Self { services, engine: FlowEngine::default(), vocabulary, resolver, fallback, chat_log }
    }

    pub fn services(&self) -> &DialogueServices {
        &self.services
    }

    /// Runs one conversational turn: records both sides in the session
    /// history and appends the exchange to the chat journal.
    pub async fn handle_turn(
        &self,
        turn: &TurnContext,
        state: &mut SessionState,
        text: &str,
    ) -> String {
        state.record_user(text);
        let reply = self.respond(turn, state, text).await;
        state.record_assistant(reply.clone());

        let entry = ChatLogEntry {
            timestamp: Utc::now(),
            session_id: turn.session_id.to_string(),
            user: text.to_string(),
            bot: reply.clone(),
        };
        if let Err(error) = self.chat_log.append_turn(&entry).await {
            error!(
                event_name = "dialogue.chat_journal_failed",
                session_id = %turn.session_id,
                error = %error,
                "could not append chat turn"
            );
        }
        reply
    }

    /// Produces the reply for `text` and mutates `state`. Never fails; every
    /// external failure degrades to a later tier or a clarifying message.
    pub async fn respond(&self, turn: &TurnContext, state: &mut SessionState, text: &str) -> String {
        if let Some(event) = self.vocabulary.interpret(state.step, text) {
            return self.run_wizard(turn, state, event).await;
        }
        if text.trim().is_empty() {
            return self.services.replies.not_understood();
        }

        let intents = self.resolver.resolve(text, state).await;
        debug!(
            event_name = "dialogue.intents_resolved",
            correlation_id = %turn.correlation_id(),
            intents = intents.len(),
            "intent resolution finished"
        );
        if intents.is_empty() {
            return self.fallback_reply(turn, state, text).await;
        }
        self.apply_intents(turn, state, text, intents).await
    }

    async fn run_wizard(
        &self,
        turn: &TurnContext,
        state: &mut SessionState,
        event: FlowEvent,
    ) -> String {
        let replies = &self.services.replies;
        let context = FlowContext { cart_is_empty: state.cart.is_empty() };
        let outcome = match self.engine.apply_with_audit(
            &state.step,
            &event,
            &context,
            self.services.audit.as_ref(),
            &turn.audit,
        ) {
            Ok(outcome) => outcome,
            Err(FlowTransitionError::EmptyCart { .. }) => return replies.empty_cart(),
            Err(error) => {
                warn!(
                    event_name = "dialogue.wizard_rejected",
                    session_id = %turn.session_id,
                    error = %error,
                    "wizard transition rejected"
                );
                return replies.not_understood();
            }
        };

        state.step = outcome.to;
        let mut fragments = Vec::new();
        for action in &outcome.actions {
            match action {
                FlowAction::EmitWelcome => fragments.push(replies.welcome()),
                FlowAction::StartPendingOrder => state.pending_order = Some(PendingOrder::default()),
                FlowAction::AskName => fragments.push(replies.checkout_start()),
                FlowAction::StoreName => {
                    if let FlowEvent::NameProvided(name) = &outcome.event {
                        state.pending_order_mut().name = Some(name.clone());
                    }
                }
                FlowAction::AskDeliveryMethod => {
                    let name = state.pending_order.as_ref().and_then(|p| p.name.clone());
                    fragments.push(replies.ask_delivery(name.as_deref().unwrap_or_default()));
                }
                FlowAction::StoreDelivery => {
                    if let FlowEvent::DeliveryChosen(method) = &outcome.event {
                        state.pending_order_mut().delivery = Some(*method);
                    }
                }
                FlowAction::AskAddress => fragments.push(replies.ask_address()),
                FlowAction::StoreAddress => {
                    if let FlowEvent::AddressProvided(address) = &outcome.event {
                        state.pending_order_mut().address = Some(address.clone());
                    }
                }
                FlowAction::AskPaymentMethod => {
                    let delivery = state.pending_order.as_ref().and_then(|p| p.delivery);
                    fragments.push(replies.ask_payment(delivery));
                }
                FlowAction::StorePayment => {
                    if let FlowEvent::PaymentChosen(method) = &outcome.event {
                        state.pending_order_mut().payment = Some(*method);
                    }
                }
                FlowAction::PresentSummary => {
                    let pending = state.pending_order.clone().unwrap_or_default();
                    fragments.push(replies.wizard_summary(&state.cart, &pending));
                }
                FlowAction::FinalizeOrder => match self.services.finalize_order(turn, state).await {
                    Some(order) => fragments.push(replies.order_confirmed(&replies.receipt(&order))),
                    None => {
                        // cart emptied mid-wizard
                        state.step = DialogueStep::Ordering;
                        state.pending_order = None;
                        fragments.push(replies.empty_cart());
                    }
                },
                FlowAction::DiscardPendingOrder => {
                    state.pending_order = None;
                    fragments.push(replies.order_cancelled());
                }
            }
        }
        fragments.join(FRAGMENT_SEPARATOR)
    }

    async fn apply_intents(
        &self,
        turn: &TurnContext,
        state: &mut SessionState,
        text: &str,
        intents: Vec<ParsedIntent>,
    ) -> String {
        let replies = &self.services.replies;
        if state.step == DialogueStep::Ordered {
            state.step = DialogueStep::Ordering;
        }

        let mut adds = Vec::new();
        let mut removes = Vec::new();
        let mut others = Vec::new();
        for intent in intents {
            match intent.intent {
                IntentKind::AddToCart => pool_items(&mut adds, intent.items),
                IntentKind::Order if !intent.items.is_empty() => pool_items(&mut adds, intent.items),
                IntentKind::Remove => pool_items(&mut removes, intent.items),
                kind => {
                    if !others.contains(&kind) {
                        others.push(kind);
                    }
                }
            }
        }

        let mut fragments = Vec::new();
        if !adds.is_empty() {
            let outcome = self.services.add_items(&mut state.cart, &adds);
            fragments.extend(outcome.missing.iter().map(|name| replies.not_in_menu(name)));
            if !outcome.added.is_empty() {
                fragments.push(self.services.confirm_added(&state.cart, &outcome.added));
            }
        }
        if !removes.is_empty() {
            let outcome = self.services.remove_items(&mut state.cart, &removes);
            fragments.extend(self.services.removal_fragments(&state.cart, &outcome));
        }

        for kind in others {
            match kind {
                IntentKind::Menu => fragments.push(format!(
                    "{}{FRAGMENT_SEPARATOR}{}",
                    replies.menu_header(),
                    replies.format_menu(&self.services.catalog)
                )),
                IntentKind::Order => {
                    fragments.push(replies.order_start());
                    fragments.push(replies.format_menu(&self.services.catalog));
                }
                IntentKind::Greet => fragments.push(replies.greet()),
                IntentKind::Info => fragments.push(replies.info()),
                IntentKind::Track => fragments.push(replies.track(state.last_order.as_ref())),
                IntentKind::Staff => fragments.push(replies.staff()),
                IntentKind::Checkout => {
                    fragments.push(self.run_wizard(turn, state, FlowEvent::CheckoutRequested).await)
                }
                IntentKind::Other => fragments.push(self.fallback_reply(turn, state, text).await),
                IntentKind::AddToCart | IntentKind::Remove => {}
            }
        }

        if fragments.is_empty() {
            return self.fallback_reply(turn, state, text).await;
        }
        fragments.join(FRAGMENT_SEPARATOR)
    }

    async fn fallback_reply(&self, turn: &TurnContext, state: &mut SessionState, text: &str) -> String {
        let mut invocation = ToolInvocation { turn, state };
        match self.fallback.respond(text, &mut invocation).await {
            Some(reply) => reply,
            None => {
                info!(
                    event_name = "dialogue.fallback.exhausted",
                    correlation_id = %turn.correlation_id(),
                    "no tier produced an answer"
                );
                self.services.replies.not_understood()
            }
        }
    }
}

/// Merges requested items by case-insensitive name, keeping the first spelling.
/// Merged quantities never exceed [`MAX_ITEM_QUANTITY`].
fn pool_items(pool: &mut Vec<(String, u32)>, items: Vec<IntentItem>) {
    for item in items {
        let key = item.name.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let requested = item.quantity.min(MAX_ITEM_QUANTITY);
        match pool.iter_mut().find(|(name, _)| name.trim().to_lowercase() == key) {
            Some((_, quantity)) => {
                *quantity = quantity.saturating_add(requested).min(MAX_ITEM_QUANTITY)
            }
            None => pool.push((item.name.trim().to_string(), requested)),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentSetupError {
    #[error("menu could not be loaded: {0}")]
    Catalog(#[from] CatalogError),
    #[error("knowledge base could not be loaded: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),
    #[error("generative model client could not be built: {0}")]
    Llm(#[from] LlmError),
    #[error("knowledge documents in `{path}` could not be read: {source}")]
    Documents { path: PathBuf, source: std::io::Error },
}

/// Wires a controller from configuration. Model-backed pieces fall back to
/// [`DisabledLlm`] when the provider is `disabled`.
pub async fn build_controller(
    config: &AppConfig,
    orders: Arc<dyn OrderLog>,
    chat_log: Arc<dyn ChatLog>,
    audit: Arc<dyn AuditSink>,
) -> Result<DialogueController, AgentSetupError> {
    let dialogue = &config.dialogue;
    let catalog = Arc::new(
        MenuCatalog::load(&config.data.menu_path)?
            .with_matcher(FuzzyMatcher::new(dialogue.fuzzy_threshold)),
    );
    let knowledge_base = Arc::new(KnowledgeBase::load(&config.data.knowledge_base_path)?);
    let replies = Arc::new(ReplyBook::new(config.restaurant.clone(), knowledge_base.templates()));

    let (llm, embedder): (Arc<dyn LlmClient>, Arc<dyn EmbeddingClient>) =
        match config.llm.provider {
            LlmProvider::Disabled => (Arc::new(DisabledLlm), Arc::new(DisabledLlm)),
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let client = Arc::new(OpenAiClient::from_config(&config.llm)?);
                (client.clone(), client)
            }
        };

    let rules: Arc<dyn IntentResolver> =
        Arc::new(RuleIntentResolver::new(knowledge_base.clone(), catalog.clone()));
    let model: Arc<dyn IntentResolver> = Arc::new(
        ModelIntentResolver::new(llm.clone(), config.restaurant.name.clone())
            .with_history_turns(dialogue.intent_history_turns),
    );
    let resolver = match dialogue.intent_strategy {
        IntentStrategy::Rules => rules,
        IntentStrategy::Model => model,
        IntentStrategy::Hybrid => Arc::new(HybridIntentResolver::new(rules, model)),
    };

    let documents = KnowledgeIndex::read_documents(&config.data.documents_dir)
        .await
        .map_err(|source| AgentSetupError::Documents {
            path: config.data.documents_dir.clone(),
            source,
        })?;
    let index = if config.llm.provider == LlmProvider::Disabled {
        KnowledgeIndex::default()
    } else {
        KnowledgeIndex::build(documents, embedder.as_ref()).await
    };
    let retrieval = Arc::new(
        RetrievalFallback::new(llm.clone(), embedder, index, config.restaurant.name.clone())
            .with_limits(dialogue.retrieval_history_turns, dialogue.retrieval_top_k),
    );

    let services = Arc::new(DialogueServices {
        catalog,
        replies,
        orders,
        audit,
        upsell_rules: knowledge_base.upsell_rules().to_vec(),
    });
    let registry = ToolRegistry::standard(services.clone(), retrieval.clone());
    let fallback = FallbackResponder::new(llm, registry, retrieval, services.clone())
        .with_history_turns(dialogue.fallback_history_turns);

    info!(
        event_name = "dialogue.controller_ready",
        intent_strategy = dialogue.intent_strategy.as_str(),
        llm_provider = config.llm.provider.as_str(),
        "dialogue controller ready"
    );
    Ok(DialogueController::new(
        services,
        knowledge_base.wizard().clone(),
        resolver,
        fallback,
        chat_log,
    ))
}
