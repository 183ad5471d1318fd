//! Append-only JSON-lines journals for finalised orders and chat turns.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use pizzabot_core::config::JournalConfig;
use pizzabot_core::domain::order::{OrderItem, OrderRecord};
use pizzabot_core::domain::session::{DeliveryMethod, PaymentMethod};
use pizzabot_core::journal::{ChatLog, ChatLogEntry, JournalError, OrderLog};

#[derive(Serialize)]
struct OrderLine<'a> {
    order_number: &'a str,
    session_id: &'a str,
    customer: Option<&'a str>,
    delivery: Option<DeliveryMethod>,
    payment: Option<PaymentMethod>,
    address: Option<&'a str>,
    items: &'a [OrderItem],
    total: Decimal,
    eta: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

impl<'a> From<&'a OrderRecord> for OrderLine<'a> {
    fn from(order: &'a OrderRecord) -> Self {
        Self {
            order_number: &order.order_number,
            session_id: &order.session_id,
            customer: order.customer.as_deref(),
            delivery: order.delivery,
            payment: order.payment,
            address: order.address.as_deref(),
            items: &order.items,
            total: order.total,
            eta: order.eta,
            timestamp: order.placed_at,
        }
    }
}

pub struct JsonlJournal {
    orders_path: PathBuf,
    chat_path: PathBuf,
    // one writer at a time keeps lines whole
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    pub fn new(orders_path: impl Into<PathBuf>, chat_path: impl Into<PathBuf>) -> Self {
        Self {
            orders_path: orders_path.into(),
            chat_path: chat_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &JournalConfig) -> Self {
        Self::new(&config.orders_path, &config.chat_path)
    }

    async fn append_line<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let io_error =
            |source: std::io::Error| JournalError::Io { path: path.display().to_string(), source };

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_error)?;
        file.write_all(&line).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)
    }
}

#[async_trait]
impl OrderLog for JsonlJournal {
    async fn append_order(&self, order: &OrderRecord) -> Result<(), JournalError> {
        self.append_line(&self.orders_path, &OrderLine::from(order)).await
    }
}

#[async_trait]
impl ChatLog for JsonlJournal {
    async fn append_turn(&self, entry: &ChatLogEntry) -> Result<(), JournalError> {
        self.append_line(&self.chat_path, entry).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value;

    use pizzabot_core::domain::order::{OrderItem, OrderRecord};
    use pizzabot_core::domain::session::{DeliveryMethod, PaymentMethod};
    use pizzabot_core::journal::{ChatLog, ChatLogEntry, JournalError, OrderLog};

    use super::JsonlJournal;

    fn lines(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .expect("read journal")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect()
    }

    #[tokio::test]
    async fn orders_and_turns_append_one_line_each() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal =
            JsonlJournal::new(dir.path().join("logs/orders.jsonl"), dir.path().join("chat.jsonl"));
        let now = Utc::now();
        let order = OrderRecord {
            order_number: "#4321".into(),
            session_id: "web-1".into(),
            items: vec![OrderItem {
                name: "Margherita".into(),
                quantity: 2,
                subtotal: Decimal::new(1300, 2),
            }],
            total: Decimal::new(1300, 2),
            eta: now,
            placed_at: now,
            customer: Some("Mario".into()),
            delivery: Some(DeliveryMethod::Pickup),
            address: None,
            payment: Some(PaymentMethod::InPizzeria),
        };

        journal.append_order(&order).await.expect("append order");
        journal.append_order(&order).await.expect("append order again");
        for text in ["ciao", "menu"] {
            let entry = ChatLogEntry {
                timestamp: now,
                session_id: "web-1".into(),
                user: text.into(),
                bot: "ok".into(),
            };
            journal.append_turn(&entry).await.expect("append turn");
        }

        let orders = lines(&dir.path().join("logs/orders.jsonl"));
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0]["order_number"], "#4321");
        assert_eq!(orders[0]["customer"], "Mario");
        assert_eq!(orders[0]["items"][0]["quantity"], 2);
        assert!(orders[0].get("timestamp").is_some());

        let turns = lines(&dir.path().join("chat.jsonl"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1]["user"], "menu");
    }

    #[tokio::test]
    async fn unwritable_path_reports_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").expect("write blocker");
        let journal = JsonlJournal::new(blocker.join("orders.jsonl"), blocker.join("chat.jsonl"));

        let entry = ChatLogEntry {
            timestamp: Utc::now(),
            session_id: "s".into(),
            user: "u".into(),
            bot: "b".into(),
        };
        let result = journal.append_turn(&entry).await;
        assert!(matches!(result, Err(JournalError::Io { .. })));
    }
}
