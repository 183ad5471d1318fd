use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use tracing::debug;

use pizzabot_core::domain::session::{SessionId, SessionState};

use super::{is_expired, timestamp, RepositoryError, SessionStore};
use crate::DbPool;

/// Sessions persisted as JSON documents in the `chat_session` table.
pub struct SqlSessionStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(&self, id: &SessionId) -> Result<SessionState, RepositoryError> {
        let row = sqlx::query("SELECT state_json, updated_at FROM chat_session WHERE session_key = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(SessionState::default());
        };
        let updated_at: String =
            row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        if is_expired(parse_timestamp(&updated_at)?, Utc::now(), self.ttl) {
            debug!(event_name = "session.expired", session_id = %id, "starting a fresh session");
            return Ok(SessionState::default());
        }

        let state_json: String =
            row.try_get("state_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        serde_json::from_str(&state_json).map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), RepositoryError> {
        let state_json =
            serde_json::to_string(state).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let now = timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO chat_session (session_key, state_json, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_key) DO UPDATE SET
                 state_json = excluded.state_json,
                 updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(&state_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let cutoff = timestamp(Utc::now() - self.ttl);
        let result = sqlx::query("DELETE FROM chat_session WHERE updated_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
