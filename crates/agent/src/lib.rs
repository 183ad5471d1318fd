//! Conversational layer of the pizzeria assistant.
//!
//! A turn flows through [`runtime::DialogueController`]:
//! 1. **Checkout wizard** - while a wizard step is active the reply is a
//!    local state transition, no model call.
//! 2. **Intent resolution** (`rules`, `conversation`) - keyword rules, the
//!    generative model, or both, producing structured intents.
//! 3. **Fallback chain** (`tools`, `retrieval`) - function calling, then
//!    retrieval-augmented generation over the knowledge documents.
//!
//! The model only translates. Prices, cart contents and order numbers are
//! always computed locally by `pizzabot-core`.

pub mod conversation;
pub mod llm;
pub mod openai;
pub mod responses;
pub mod retrieval;
pub mod rules;
pub mod runtime;
pub mod services;
pub mod tools;

#[cfg(test)]
mod testing;

pub use runtime::{build_controller, AgentSetupError, DialogueController};
pub use services::TurnContext;
