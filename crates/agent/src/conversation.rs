use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use pizzabot_core::cart::MAX_ITEM_QUANTITY;
use pizzabot_core::domain::intent::{IntentItem, IntentKind, ParsedIntent};
use pizzabot_core::domain::session::{ChatRole, SessionState};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

pub const INTENT_TEMPERATURE: f32 = 0.2;

/// Shared contract of the intent strategies. Resolvers never fail: anything
/// they cannot make sense of comes back as an empty list.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, text: &str, session: &SessionState) -> Vec<ParsedIntent>;
}

/// Generative-model strategy: asks the model for a JSON array of intents.
pub struct ModelIntentResolver {
    llm: Arc<dyn LlmClient>,
    restaurant_name: String,
    history_turns: usize,
}

impl ModelIntentResolver {
    pub fn new(llm: Arc<dyn LlmClient>, restaurant_name: impl Into<String>) -> Self {
        Self { llm, restaurant_name: restaurant_name.into(), history_turns: 6 }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn build_prompt(&self, text: &str, session: &SessionState) -> String {
        let summary = session.cart.summarize();
        let cart_text = if summary.is_empty() {
            "Carrello vuoto".to_string()
        } else {
            summary
                .lines
                .iter()
                .map(|line| format!("{} x{}", line.name, line.quantity))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let history = session
            .history_before(text, self.history_turns)
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    ChatRole::Assistant => "Bot",
                    ChatRole::User => "User",
                };
                format!("{speaker}: {}", turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let last_order = match &session.last_order {
            Some(order) => format!(
                "Numero {}, pronto alle {}, totale €{:.2}",
                order.number,
                order.eta.with_timezone(&chrono::Local).format("%H:%M"),
                order.total
            ),
            None => "Nessuno".to_string(),
        };

        let vocabulary = IntentKind::ALL
            .iter()
            .map(|kind| format!("\"{}\"", kind.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Sei Mario, un assistente virtuale italiano per {name}. Il tuo compito è analizzare il \
             messaggio dell'utente\ne restituire *una lista JSON* con tutte le intenzioni \
             riconosciute e gli articoli menzionati.\n\n\
             Formato di output JSON:\n\
             [\n  {{\n    \"intent\": \"add_to_cart\",\n    \"items\": [{{\"name\": \"Coca-Cola\", \"quantity\": 1}}]\n  }},\n  \
             {{\n    \"intent\": \"remove\",\n    \"items\": [{{\"name\": \"Diavola\", \"quantity\": 1}}]\n  }}\n]\n\n\
             Valori validi per 'intent':\n[{vocabulary}]\n\n\
             Rispondi solo con un JSON valido. Nessuna spiegazione.\n\
             Contesto:\n\
             Carrello attuale:\n{cart_text}\n\
             Conversazione recente:\n{history}\n\
             Ultimo ordine:\n{last_order}\n\
             Messaggio utente:\n{text}",
            name = self.restaurant_name,
        )
    }
}

#[async_trait]
impl IntentResolver for ModelIntentResolver {
    async fn resolve(&self, text: &str, session: &SessionState) -> Vec<ParsedIntent> {
        let prompt = self.build_prompt(text, session);
        let request =
            ChatRequest::new(vec![ChatMessage::system(prompt)]).with_temperature(INTENT_TEMPERATURE);

        match self.llm.chat(request).await {
            Ok(reply) => {
                let raw = reply.content.unwrap_or_default();
                let intents = extract_intents(&raw);
                debug!(
                    event_name = "dialogue.model_intents",
                    parsed = intents.len(),
                    "model intent parse finished"
                );
                intents
            }
            Err(error) => {
                warn!(
                    event_name = "dialogue.model_intents_failed",
                    error = %error,
                    "model intent parse failed"
                );
                Vec::new()
            }
        }
    }
}

/// Rules first. The model is consulted when the rules produce nothing
/// actionable, such as "aggiungi" followed by a name the catalog does not
/// know; the rule answer stands if the model has nothing better.
pub struct HybridIntentResolver {
    primary: Arc<dyn IntentResolver>,
    secondary: Arc<dyn IntentResolver>,
}

impl HybridIntentResolver {
    pub fn new(primary: Arc<dyn IntentResolver>, secondary: Arc<dyn IntentResolver>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl IntentResolver for HybridIntentResolver {
    async fn resolve(&self, text: &str, session: &SessionState) -> Vec<ParsedIntent> {
        let intents = self.primary.resolve(text, session).await;
        if intents.iter().any(ParsedIntent::is_actionable) {
            return intents;
        }
        let refined = self.secondary.resolve(text, session).await;
        if refined.is_empty() {
            intents
        } else {
            refined
        }
    }
}

#[derive(Deserialize)]
struct RawIntent {
    intent: String,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    name: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Decodes the first JSON array in `raw` into intents. Any shape problem,
/// unknown intent, blank item name or quantity outside
/// `1..=MAX_ITEM_QUANTITY` rejects the whole answer.
pub fn extract_intents(raw: &str) -> Vec<ParsedIntent> {
    let Some(array) = first_json_array(raw) else {
        return Vec::new();
    };
    let Ok(decoded) = serde_json::from_str::<Vec<RawIntent>>(array) else {
        return Vec::new();
    };

    let mut intents = Vec::with_capacity(decoded.len());
    for raw_intent in decoded {
        let Ok(intent) = raw_intent.intent.parse::<IntentKind>() else {
            return Vec::new();
        };
        let mut items = Vec::with_capacity(raw_intent.items.len());
        for item in raw_intent.items {
            let name = item.name.trim();
            if name.is_empty() || !(1..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
                return Vec::new();
            }
            items.push(IntentItem { name: name.to_string(), quantity: item.quantity });
        }
        intents.push(ParsedIntent::with_items(intent, items));
    }
    intents
}

/// Slice of the first balanced `[...]` in `raw`, ignoring brackets inside
/// string literals.
fn first_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use pizzabot_core::domain::intent::{IntentItem, IntentKind, ParsedIntent};
    use pizzabot_core::domain::session::{LastOrder, SessionState};

    use super::{
        extract_intents, first_json_array, HybridIntentResolver, IntentResolver,
        ModelIntentResolver,
    };
    use crate::llm::{ChatReply, LlmError};
    use crate::rules::RuleIntentResolver;
    use crate::testing::{catalog, knowledge_base, ScriptedLlm};

    #[test]
    fn extracts_array_wrapped_in_prose_and_fences() {
        let raw = "Ecco il risultato:\n```json\n[{\"intent\": \"add_to_cart\", \"items\": \
                   [{\"name\": \"Diavola\", \"quantity\": 2}]}, {\"intent\": \"info\"}]\n```\nFine.";
        assert_eq!(
            extract_intents(raw),
            vec![
                ParsedIntent::with_items(
                    IntentKind::AddToCart,
                    vec![IntentItem { name: "Diavola".into(), quantity: 2 }]
                ),
                ParsedIntent::bare(IntentKind::Info),
            ]
        );
    }

    #[test]
    fn brackets_inside_strings_do_not_close_the_array() {
        let raw = r#"[{"intent": "remove", "items": [{"name": "Pizza [speciale]"}]}] poi [1]"#;
        assert_eq!(
            first_json_array(raw),
            Some(r#"[{"intent": "remove", "items": [{"name": "Pizza [speciale]"}]}]"#)
        );
        assert_eq!(extract_intents(raw)[0].items[0].quantity, 1);
    }

    #[test]
    fn shape_mismatch_fails_closed() {
        assert!(extract_intents("nessun json qui").is_empty());
        assert!(extract_intents("[{\"intent\": \"dance\"}]").is_empty());
        assert!(extract_intents("[{\"intent\": \"menu\"}, {\"intent\": \"fly\"}]").is_empty());
        assert!(extract_intents("[{\"intent\": \"add_to_cart\", \"items\": [{\"name\": \" \"}]}]")
            .is_empty());
        assert!(extract_intents(
            "[{\"intent\": \"add_to_cart\", \"items\": [{\"name\": \"Acqua\", \"quantity\": 0}]}]"
        )
        .is_empty());
        assert!(extract_intents(
            "[{\"intent\": \"add_to_cart\", \"items\": [{\"name\": \"Acqua\", \"quantity\": 4000000000}]}]"
        )
        .is_empty());
        assert!(extract_intents("[{\"items\": []}]").is_empty());
        assert!(extract_intents("[1, 2").is_empty());
    }

    #[test]
    fn prompt_carries_cart_history_and_last_order() {
        let catalog = catalog();
        let mut session = SessionState::default();
        session.cart.add(catalog.find("Diavola").expect("fixture"), 2);
        for index in 0..8 {
            session.record_user(format!("u{index}"));
            session.record_assistant(format!("b{index}"));
        }
        session.last_order =
            Some(LastOrder { number: "#4321".into(), eta: Utc::now(), total: Decimal::new(16, 0) });

        let resolver = ModelIntentResolver::new(Arc::new(ScriptedLlm::default()), "Da Mario");
        let prompt = resolver.build_prompt("e una coca", &session);

        assert!(prompt.starts_with("Sei Mario, un assistente virtuale italiano per Da Mario."));
        assert!(prompt.contains("Carrello attuale:\nDiavola x2"));
        assert!(prompt.contains("User: u5\nBot: b5"));
        assert!(!prompt.contains("u4"), "only the last six turns are included");
        assert!(prompt.contains("Numero #4321"));
        assert!(prompt.contains("\"staff\""));
        assert!(prompt.ends_with("Messaggio utente:\ne una coca"));

        let empty = resolver.build_prompt("ciao", &SessionState::default());
        assert!(empty.contains("Carrello vuoto"));
        assert!(empty.contains("Ultimo ordine:\nNessuno"));
    }

    #[tokio::test]
    async fn model_resolver_uses_low_temperature_and_survives_failures() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(ChatReply::text("[{\"intent\": \"menu\"}]")),
            Err(LlmError::Transport { message: "timeout".into(), retryable: true }),
        ]));
        let resolver = ModelIntentResolver::new(llm.clone(), "Da Mario");
        let session = SessionState::default();

        let parsed = resolver.resolve("menu?", &session).await;
        assert_eq!(parsed, vec![ParsedIntent::bare(IntentKind::Menu)]);
        assert!(resolver.resolve("menu?", &session).await.is_empty());

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].temperature, Some(0.2));
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn hybrid_consults_model_only_when_rules_are_silent() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(ChatReply::text(
            "[{\"intent\": \"staff\"}]",
        ))]));
        let rules = Arc::new(RuleIntentResolver::new(
            Arc::new(knowledge_base()),
            Arc::new(catalog()),
        ));
        let model = Arc::new(ModelIntentResolver::new(llm.clone(), "Da Mario"));
        let hybrid = HybridIntentResolver::new(rules, model);
        let session = SessionState::default();

        assert_eq!(hybrid.resolve("ciao", &session).await[0].intent, IntentKind::Greet);
        assert!(llm.requests().is_empty());

        let staff = hybrid.resolve("posso parlare con qualcuno?", &session).await;
        assert_eq!(staff, vec![ParsedIntent::bare(IntentKind::Staff)]);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn hybrid_asks_the_model_when_rules_name_no_items() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(ChatReply::text(
            "[{\"intent\": \"add_to_cart\", \"items\": [{\"name\": \"XYZ123\", \"quantity\": 1}]}]",
        ))]));
        let rules = Arc::new(RuleIntentResolver::new(
            Arc::new(knowledge_base()),
            Arc::new(catalog()),
        ));
        let model = Arc::new(ModelIntentResolver::new(llm.clone(), "Da Mario"));
        let hybrid = HybridIntentResolver::new(rules, model);
        let session = SessionState::default();

        let parsed = hybrid.resolve("aggiungi XYZ123", &session).await;
        assert_eq!(
            parsed,
            vec![ParsedIntent::with_items(IntentKind::AddToCart, vec![IntentItem::single("XYZ123")])]
        );
        assert_eq!(llm.requests().len(), 1);

        // the model has run dry, so the bare rule answer stands
        let fallback = hybrid.resolve("aggiungi XYZ123", &session).await;
        assert_eq!(fallback, vec![ParsedIntent::bare(IntentKind::AddToCart)]);
        assert_eq!(llm.requests().len(), 2);
    }
}
