use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::OrderRecord;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io failure on `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("journal encode failure: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub user: String,
    pub bot: String,
}

/// Append-only sink for finalised orders. Never read back by the dialogue.
#[async_trait]
pub trait OrderLog: Send + Sync {
    async fn append_order(&self, order: &OrderRecord) -> Result<(), JournalError>;
}

#[async_trait]
pub trait ChatLog: Send + Sync {
    async fn append_turn(&self, entry: &ChatLogEntry) -> Result<(), JournalError>;
}

#[derive(Clone, Default)]
pub struct InMemoryJournal {
    orders: Arc<Mutex<Vec<OrderRecord>>>,
    turns: Arc<Mutex<Vec<ChatLogEntry>>>,
}

impl InMemoryJournal {
    pub fn orders(&self) -> Vec<OrderRecord> {
        match self.orders.lock() {
            Ok(orders) => orders.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn turns(&self) -> Vec<ChatLogEntry> {
        match self.turns.lock() {
            Ok(turns) => turns.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl OrderLog for InMemoryJournal {
    async fn append_order(&self, order: &OrderRecord) -> Result<(), JournalError> {
        match self.orders.lock() {
            Ok(mut orders) => orders.push(order.clone()),
            Err(poisoned) => poisoned.into_inner().push(order.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl ChatLog for InMemoryJournal {
    async fn append_turn(&self, entry: &ChatLogEntry) -> Result<(), JournalError> {
        match self.turns.lock() {
            Ok(mut turns) => turns.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
        Ok(())
    }
}
