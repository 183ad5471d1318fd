//! Localized rule knowledge base and the deterministic intent strategy.
//!
//! The knowledge base file is a JSON array. Most entries are
//! `{"utterance": ..., "intent": ...}` pairs; one entry is a configuration
//! block carrying `actions` and `responses_template`, plus the optional
//! `wizard` vocabulary and `upsell` rules that vary between deployments.
//! Other keys in that block (`categories`, `quantifiers`) are ignored.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use pizzabot_core::cart::UpsellRule;
use pizzabot_core::catalog::MenuCatalog;
use pizzabot_core::domain::intent::{IntentItem, IntentKind, ParsedIntent};
use pizzabot_core::domain::session::SessionState;
use pizzabot_core::flows::WizardVocabulary;

use crate::conversation::IntentResolver;

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("could not read knowledge base `{path}`: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("knowledge base is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("knowledge base contains more than one configuration block")]
    DuplicateConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtteranceRule {
    pub pattern: String,
    pub intent: IntentKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordRule {
    pub intent: IntentKind,
    pub keywords: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    utterances: Vec<UtteranceRule>,
    actions: Vec<KeywordRule>,
    templates: BTreeMap<String, String>,
    wizard: WizardVocabulary,
    upsell: Vec<UpsellRule>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Utterance { utterance: String, intent: String },
    Config(Box<RawConfig>),
}

#[derive(Deserialize)]
struct RawConfig {
    /// Kept as a raw map so keyword groups stay in file order.
    #[serde(default)]
    actions: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    responses_template: BTreeMap<String, String>,
    #[serde(default)]
    wizard: Option<WizardVocabulary>,
    #[serde(default)]
    upsell: Option<Vec<UpsellRule>>,
}

impl KnowledgeBase {
    pub fn from_json(raw: &str) -> Result<Self, KnowledgeBaseError> {
        let entries: Vec<RawEntry> = serde_json::from_str(raw)?;
        let mut kb = KnowledgeBase { upsell: UpsellRule::defaults(), ..Self::default() };
        let mut seen_config = false;

        for entry in entries {
            match entry {
                RawEntry::Utterance { utterance, intent } => {
                    let pattern = utterance.trim().to_lowercase();
                    if pattern.is_empty() {
                        continue;
                    }
                    match intent.parse::<IntentKind>() {
                        Ok(intent) => kb.utterances.push(UtteranceRule { pattern, intent }),
                        Err(error) => warn!(
                            event_name = "kb.utterance_skipped",
                            utterance = %utterance,
                            error = %error,
                            "skipping utterance with unknown intent"
                        ),
                    }
                }
                RawEntry::Config(config) => {
                    if seen_config {
                        return Err(KnowledgeBaseError::DuplicateConfig);
                    }
                    seen_config = true;
                    kb.apply_config(*config);
                }
            }
        }

        Ok(kb)
    }

    pub fn load(path: &Path) -> Result<Self, KnowledgeBaseError> {
        let raw = std::fs::read_to_string(path).map_err(|source| KnowledgeBaseError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn apply_config(&mut self, config: RawConfig) {
        for (intent, keywords) in config.actions {
            let Ok(kind) = intent.parse::<IntentKind>() else {
                warn!(event_name = "kb.action_skipped", intent = %intent, "unknown action intent");
                continue;
            };
            let keywords = match keywords {
                serde_json::Value::Array(values) => values
                    .into_iter()
                    .filter_map(|value| value.as_str().map(str::to_lowercase))
                    .filter(|kw| !kw.trim().is_empty())
                    .collect::<Vec<_>>(),
                serde_json::Value::String(single) if !single.trim().is_empty() => {
                    vec![single.to_lowercase()]
                }
                _ => Vec::new(),
            };
            if !keywords.is_empty() {
                self.actions.push(KeywordRule { intent: kind, keywords });
            }
        }
        self.templates = config.responses_template;
        if let Some(wizard) = config.wizard {
            self.wizard = wizard;
        }
        if let Some(upsell) = config.upsell {
            self.upsell = upsell;
        }
    }

    pub fn utterances(&self) -> &[UtteranceRule] {
        &self.utterances
    }

    pub fn actions(&self) -> &[KeywordRule] {
        &self.actions
    }

    pub fn templates(&self) -> &BTreeMap<String, String> {
        &self.templates
    }

    pub fn wizard(&self) -> &WizardVocabulary {
        &self.wizard
    }

    pub fn upsell_rules(&self) -> &[UpsellRule] {
        &self.upsell
    }

    /// First utterance pattern equal to or contained in `lowered`.
    fn match_utterance(&self, lowered: &str) -> Option<IntentKind> {
        self.utterances
            .iter()
            .find(|rule| rule.pattern == lowered || lowered.contains(&rule.pattern))
            .map(|rule| rule.intent)
    }

    /// First action group with a keyword contained in `lowered`.
    fn match_keyword(&self, lowered: &str) -> Option<IntentKind> {
        self.actions
            .iter()
            .find(|rule| rule.keywords.iter().any(|keyword| lowered.contains(keyword.as_str())))
            .map(|rule| rule.intent)
    }
}

/// Deterministic phrase-table strategy.
pub struct RuleIntentResolver {
    knowledge_base: Arc<KnowledgeBase>,
    catalog: Arc<MenuCatalog>,
}

impl RuleIntentResolver {
    pub fn new(knowledge_base: Arc<KnowledgeBase>, catalog: Arc<MenuCatalog>) -> Self {
        Self { knowledge_base, catalog }
    }

    pub fn classify(&self, text: &str) -> Vec<ParsedIntent> {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return Vec::new();
        }

        let Some(mut intent) = self
            .knowledge_base
            .match_utterance(&lowered)
            .or_else(|| self.knowledge_base.match_keyword(&lowered))
        else {
            return Vec::new();
        };

        let mut items = Vec::new();
        if intent.carries_items() {
            items = self
                .catalog
                .mentioned_in(&lowered)
                .into_iter()
                .map(|item| IntentItem::single(item.name.clone()))
                .collect::<Vec<_>>();
            if intent == IntentKind::Order && !items.is_empty() {
                intent = IntentKind::AddToCart;
            }
        }

        debug!(
            event_name = "dialogue.rules_matched",
            intent = intent.as_str(),
            items = items.len(),
            "rule strategy matched"
        );
        vec![ParsedIntent::with_items(intent, items)]
    }
}

#[async_trait]
impl IntentResolver for RuleIntentResolver {
    async fn resolve(&self, text: &str, _session: &SessionState) -> Vec<ParsedIntent> {
        self.classify(text)
    }
}
