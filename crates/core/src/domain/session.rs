use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a conversation inside the checkout wizard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStep {
    #[default]
    Start,
    Ordering,
    AwaitName,
    AwaitDeliveryMethod,
    AwaitAddress,
    AwaitPaymentMethod,
    AwaitOrderConfirmation,
    Ordered,
}

impl DialogueStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Ordering => "ordering",
            Self::AwaitName => "await_name",
            Self::AwaitDeliveryMethod => "await_delivery_method",
            Self::AwaitAddress => "await_address",
            Self::AwaitPaymentMethod => "await_payment_method",
            Self::AwaitOrderConfirmation => "await_order_confirmation",
            Self::Ordered => "ordered",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One history entry. Older sessions stored bare strings for bot replies; those
/// decode as assistant turns so consumers only ever see the tagged form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChatTurnRepr")]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatTurnRepr {
    Tagged {
        #[serde(default = "assistant_role")]
        role: ChatRole,
        #[serde(default)]
        content: String,
    },
    Legacy(String),
}

fn assistant_role() -> ChatRole {
    ChatRole::Assistant
}

impl From<ChatTurnRepr> for ChatTurn {
    fn from(value: ChatTurnRepr) -> Self {
        match value {
            ChatTurnRepr::Tagged { role, content } => Self { role, content },
            ChatTurnRepr::Legacy(content) => Self::assistant(content),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMethod {
    #[serde(rename = "domicilio")]
    HomeDelivery,
    #[serde(rename = "ritiro")]
    Pickup,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomeDelivery => "domicilio",
            Self::Pickup => "ritiro",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "in pizzeria")]
    InPizzeria,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::InPizzeria => "in pizzeria",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub name: Option<String>,
    pub delivery: Option<DeliveryMethod>,
    pub address: Option<String>,
    pub payment: Option<PaymentMethod>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOrder {
    pub number: String,
    pub eta: DateTime<Utc>,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub step: DialogueStep,
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub pending_order: Option<PendingOrder>,
    #[serde(default)]
    pub last_order: Option<LastOrder>,
}

impl SessionState {
    pub fn record_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatTurn::user(content));
    }

    pub fn record_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatTurn::assistant(content));
    }

    /// The last `limit` history entries, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[ChatTurn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Up to `limit` entries preceding `pending`, the user message being
    /// answered, when it is already recorded as the last entry.
    pub fn history_before(&self, pending: &str, limit: usize) -> &[ChatTurn] {
        let end = match self.history.last() {
            Some(turn) if turn.role == ChatRole::User && turn.content == pending => {
                self.history.len() - 1
            }
            _ => self.history.len(),
        };
        let start = end.saturating_sub(limit);
        &self.history[start..end]
    }

    pub fn pending_order_mut(&mut self) -> &mut PendingOrder {
        self.pending_order.get_or_insert_with(PendingOrder::default)
    }
}
