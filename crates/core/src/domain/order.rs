use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::session::{DeliveryMethod, PaymentMethod};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// A finalised order as written to the order journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_number: String,
    pub session_id: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub eta: DateTime<Utc>,
    pub placed_at: DateTime<Utc>,
    pub customer: Option<String>,
    pub delivery: Option<DeliveryMethod>,
    pub address: Option<String>,
    pub payment: Option<PaymentMethod>,
}

impl OrderRecord {
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
