use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;

use pizzabot_core::domain::session::{SessionId, SessionState};
use pizzabot_core::errors::{ApplicationError, DomainError};

pub mod memory;
pub mod session;

pub use memory::InMemorySessionStore;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Decode(detail) => DomainError::CorruptedSession(detail).into(),
            RepositoryError::Database(error) => ApplicationError::SessionStore(error.to_string()),
        }
    }
}

/// Per-session conversation state keyed by session identity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored state, or a fresh one when the session is unknown or its
    /// last write is older than the store's TTL.
    async fn load(&self, id: &SessionId) -> Result<SessionState, RepositoryError>;
    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), RepositoryError>;
    /// Deletes expired sessions and returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, RepositoryError>;
}

pub(crate) fn is_expired(updated_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(updated_at) > ttl
}

/// Fixed-width UTC timestamps so stored values compare lexically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
