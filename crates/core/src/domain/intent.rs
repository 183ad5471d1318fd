use serde::{Deserialize, Serialize};

/// Closed vocabulary of user goals the resolvers may emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    AddToCart,
    Remove,
    Order,
    Menu,
    Checkout,
    Greet,
    Info,
    Track,
    Staff,
    Other,
}

impl IntentKind {
    pub const ALL: [IntentKind; 10] = [
        Self::AddToCart,
        Self::Remove,
        Self::Order,
        Self::Menu,
        Self::Checkout,
        Self::Greet,
        Self::Info,
        Self::Track,
        Self::Staff,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddToCart => "add_to_cart",
            Self::Remove => "remove",
            Self::Order => "order",
            Self::Menu => "menu",
            Self::Checkout => "checkout",
            Self::Greet => "greet",
            Self::Info => "info",
            Self::Track => "track",
            Self::Staff => "staff",
            Self::Other => "other",
        }
    }

    /// Intents whose items mutate the cart and are pooled across one utterance.
    pub fn mutates_cart(&self) -> bool {
        matches!(self, Self::AddToCart | Self::Remove)
    }

    pub fn carries_items(&self) -> bool {
        matches!(self, Self::AddToCart | Self::Remove | Self::Order)
    }
}

impl std::str::FromStr for IntentKind {
    type Err = UnknownIntent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownIntent(value.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent `{0}`")]
pub struct UnknownIntent(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentItem {
    pub name: String,
    pub quantity: u32,
}

impl IntentItem {
    pub fn single(name: impl Into<String>) -> Self {
        Self { name: name.into(), quantity: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub intent: IntentKind,
    #[serde(default)]
    pub items: Vec<IntentItem>,
}

impl ParsedIntent {
    pub fn bare(intent: IntentKind) -> Self {
        Self { intent, items: Vec::new() }
    }

    pub fn with_items(intent: IntentKind, items: Vec<IntentItem>) -> Self {
        Self { intent, items }
    }

    /// False for an add or remove that names no items.
    pub fn is_actionable(&self) -> bool {
        !(self.intent.mutates_cart() && self.items.is_empty())
    }
}
