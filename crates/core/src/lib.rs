pub mod audit;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod journal;
pub mod payments;

pub use cart::{
    checkout, upsell_suggestion, Cart, CartSummary, CheckoutOutcome, UpsellRule, MAX_ITEM_QUANTITY,
};
pub use catalog::{CatalogError, FuzzyMatcher, MenuCatalog};
pub use domain::intent::{IntentItem, IntentKind, ParsedIntent};
pub use domain::menu::{MenuCategory, MenuItem, MenuSection};
pub use domain::order::{OrderItem, OrderRecord};
pub use domain::session::{
    ChatRole, ChatTurn, DeliveryMethod, DialogueStep, LastOrder, PaymentMethod, PendingOrder,
    SessionId, SessionState,
};
pub use errors::{ApplicationError, DomainError, InterfaceError, InterfaceErrorKind};
pub use journal::{ChatLog, ChatLogEntry, InMemoryJournal, JournalError, OrderLog};
