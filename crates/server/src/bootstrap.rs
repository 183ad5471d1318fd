use std::sync::Arc;

use pizzabot_agent::{build_controller, AgentSetupError};
use pizzabot_core::config::AppConfig;
use pizzabot_db::{
    connect_from_config, migrations, DbPool, JsonlJournal, SessionStore, SqlSessionStore,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::TracingAuditSink;
use crate::sessions::AppState;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("dialogue setup failed: {0}")]
    Agent(#[from] AgentSetupError),
}

/// Connects storage, loads menu and knowledge data, and wires the router
/// state. Startup stops at the first failure.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = Arc::new(config);

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "session database connected and migrated"
    );

    let sessions = SqlSessionStore::new(db_pool.clone(), config.dialogue.session_ttl());
    match sessions.purge_expired().await {
        Ok(purged) => info!(
            event_name = "system.bootstrap.sessions_purged",
            correlation_id = "bootstrap",
            purged,
            "expired sessions removed"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.sessions_purge_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not purge expired sessions"
        ),
    }

    let journal = Arc::new(JsonlJournal::from_config(&config.journal));
    let controller =
        build_controller(&config, journal.clone(), journal, Arc::new(TracingAuditSink)).await?;
    info!(
        event_name = "system.bootstrap.dialogue_ready",
        correlation_id = "bootstrap",
        items = controller.services().catalog.items().count(),
        intent_strategy = config.dialogue.intent_strategy.as_str(),
        llm_provider = config.llm.provider.as_str(),
        "dialogue controller ready"
    );

    let state = AppState::new(controller, Arc::new(sessions), config.clone());
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pizzabot_core::domain::session::{DialogueStep, SessionId};

    use super::{bootstrap_with_config, BootstrapError};
    use crate::chat::{converse, new_turn};
    use crate::test_support::test_config;

    #[tokio::test]
    async fn bootstrap_wires_sessions_that_persist_across_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.database.url = format!("sqlite://{}", dir.path().join("sessions.db").display());

        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'chat_session'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(tables, 1);

        let id = SessionId("web:boot".into());
        converse(&app.state, &new_turn(id.clone(), "test"), "ciao").await.expect("first turn");
        let outcome = converse(&app.state, &new_turn(id.clone(), "test"), "vorrei una diavola")
            .await
            .expect("second turn");
        assert_eq!(outcome.cart.len(), 1);

        let stored = app.state.sessions.load(&id).await.expect("load");
        assert_eq!(stored.step, DialogueStep::Ordering);
        assert_eq!(stored.history.len(), 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn missing_menu_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.database.url = format!("sqlite://{}", dir.path().join("sessions.db").display());
        config.data.menu_path = PathBuf::from("/nonexistent/menu.json");

        let result = bootstrap_with_config(config).await;
        assert!(matches!(result, Err(BootstrapError::Agent(_))));
    }
}
