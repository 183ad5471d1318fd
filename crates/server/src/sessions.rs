//! Shared handler state and the per-session turn lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use pizzabot_agent::DialogueController;
use pizzabot_core::config::AppConfig;
use pizzabot_db::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DialogueController>,
    pub sessions: Arc<dyn SessionStore>,
    pub locks: SessionLocks,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        controller: DialogueController,
        sessions: Arc<dyn SessionStore>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { controller: Arc::new(controller), sessions, locks: SessionLocks::default(), config }
    }
}

/// One async mutex per session key. Turns for the same key run one after
/// another; different keys never contend.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
