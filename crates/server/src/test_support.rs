//! Router state wired against the shipped data files and a throwaway
//! journal directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request},
};

use pizzabot_agent::build_controller;
use pizzabot_core::audit::NoopAuditSink;
use pizzabot_core::config::AppConfig;
use pizzabot_db::{InMemorySessionStore, JsonlJournal};

use crate::sessions::AppState;

fn repo_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
}

pub fn test_config(journal_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data.menu_path = repo_path("data/menu.json");
    config.data.knowledge_base_path = repo_path("data/italian_kb.json");
    config.data.documents_dir = repo_path("data/kb_docs");
    config.server.static_dir = repo_path("static");
    config.journal.orders_path = journal_dir.join("orders.jsonl");
    config.journal.chat_path = journal_dir.join("chat.jsonl");
    config
}

pub async fn app_state_with(journal_dir: &Path, adjust: impl FnOnce(&mut AppConfig)) -> AppState {
    let mut config = test_config(journal_dir);
    adjust(&mut config);

    let journal = Arc::new(JsonlJournal::from_config(&config.journal));
    let controller =
        build_controller(&config, journal.clone(), journal, Arc::new(NoopAuditSink))
            .await
            .expect("controller should build from shipped data");
    let sessions = Arc::new(InMemorySessionStore::new(config.dialogue.session_ttl()));
    AppState::new(controller, sessions, Arc::new(config))
}

pub async fn app_state(journal_dir: &Path) -> AppState {
    app_state_with(journal_dir, |_| {}).await
}

pub fn chat_request(message: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::post("/chat").header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let body = serde_json::json!({ "message": message }).to_string();
    request.body(Body::from(body)).expect("chat request")
}
