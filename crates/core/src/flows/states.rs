use serde::{Deserialize, Serialize};

use crate::domain::session::{DeliveryMethod, DialogueStep, PaymentMethod};

pub type FlowState = DialogueStep;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Greeted,
    CheckoutRequested,
    NameProvided(String),
    DeliveryChosen(DeliveryMethod),
    AddressProvided(String),
    PaymentChosen(PaymentMethod),
    OrderConfirmed,
    OrderDeclined,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Greeted => "greeted",
            Self::CheckoutRequested => "checkout_requested",
            Self::NameProvided(_) => "name_provided",
            Self::DeliveryChosen(_) => "delivery_chosen",
            Self::AddressProvided(_) => "address_provided",
            Self::PaymentChosen(_) => "payment_chosen",
            Self::OrderConfirmed => "order_confirmed",
            Self::OrderDeclined => "order_declined",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub cart_is_empty: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    EmitWelcome,
    StartPendingOrder,
    AskName,
    StoreName,
    AskDeliveryMethod,
    StoreDelivery,
    AskAddress,
    StoreAddress,
    AskPaymentMethod,
    StorePayment,
    PresentSummary,
    FinalizeOrder,
    DiscardPendingOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

/// Keyword lists the wizard uses to read free-text answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardVocabulary {
    pub welcome_command: String,
    pub home_delivery_keywords: Vec<String>,
    pub online_payment_keywords: Vec<String>,
    pub affirmatives: Vec<String>,
}

impl Default for WizardVocabulary {
    fn default() -> Self {
        Self {
            welcome_command: "!welcome".to_string(),
            home_delivery_keywords: vec!["domicilio".to_string(), "consegna".to_string()],
            online_payment_keywords: vec!["online".to_string(), "carta".to_string()],
            affirmatives: ["sì", "si", "yes", "confermo", "ok"].map(String::from).to_vec(),
        }
    }
}

impl WizardVocabulary {
    /// Maps an inbound message onto a wizard event for the current step.
    /// `None` means the wizard has nothing to say and the intent pipeline
    /// takes over.
    pub fn interpret(&self, step: FlowState, text: &str) -> Option<FlowEvent> {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        match step {
            DialogueStep::Start => Some(FlowEvent::Greeted),
            DialogueStep::Ordering | DialogueStep::Ordered => {
                (trimmed == self.welcome_command).then_some(FlowEvent::Greeted)
            }
            DialogueStep::AwaitName => Some(FlowEvent::NameProvided(trimmed.to_string())),
            DialogueStep::AwaitDeliveryMethod => {
                let method = if contains_any(&lowered, &self.home_delivery_keywords) {
                    DeliveryMethod::HomeDelivery
                } else {
                    DeliveryMethod::Pickup
                };
                Some(FlowEvent::DeliveryChosen(method))
            }
            DialogueStep::AwaitAddress => Some(FlowEvent::AddressProvided(trimmed.to_string())),
            DialogueStep::AwaitPaymentMethod => {
                let method = if contains_any(&lowered, &self.online_payment_keywords) {
                    PaymentMethod::Online
                } else {
                    PaymentMethod::InPizzeria
                };
                Some(FlowEvent::PaymentChosen(method))
            }
            DialogueStep::AwaitOrderConfirmation => {
                if self.affirmatives.iter().any(|word| word.to_lowercase() == lowered) {
                    Some(FlowEvent::OrderConfirmed)
                } else {
                    Some(FlowEvent::OrderDeclined)
                }
            }
        }
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| !keyword.is_empty() && text.contains(&keyword.to_lowercase()))
}
