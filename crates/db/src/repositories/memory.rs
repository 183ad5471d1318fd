use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use pizzabot_core::domain::session::{SessionId, SessionState};

use super::{is_expired, RepositoryError, SessionStore};

/// Process-local session store used by the CLI and tests.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, (SessionState, DateTime<Utc>)>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    #[cfg(test)]
    async fn insert_at(&self, id: &SessionId, state: SessionState, updated_at: DateTime<Utc>) {
        self.sessions.write().await.insert(id.0.clone(), (state, updated_at));
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<SessionState, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(match sessions.get(&id.0) {
            Some((state, updated_at)) if !is_expired(*updated_at, Utc::now(), self.ttl) => {
                state.clone()
            }
            _ => SessionState::default(),
        })
    }

    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.0.clone(), (state.clone(), Utc::now()));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, updated_at)| !is_expired(*updated_at, now, self.ttl));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use pizzabot_core::domain::session::{DialogueStep, SessionId, SessionState};

    use super::InMemorySessionStore;
    use crate::repositories::SessionStore;

    #[tokio::test]
    async fn in_memory_session_round_trip() {
        let store = InMemorySessionStore::default();
        let id = SessionId("cli".into());
        let state = SessionState { step: DialogueStep::Ordering, ..SessionState::default() };

        store.save(&id, &state).await.expect("save");

        assert_eq!(store.load(&id).await.expect("load"), state);
    }

    #[tokio::test]
    async fn stale_entries_read_as_new_and_purge() {
        let store = InMemorySessionStore::new(Duration::minutes(5));
        let id = SessionId("stale".into());
        let state = SessionState { step: DialogueStep::AwaitName, ..SessionState::default() };
        store.insert_at(&id, state, Utc::now() - Duration::minutes(6)).await;

        assert_eq!(store.load(&id).await.expect("load").step, DialogueStep::Start);
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
    }
}
