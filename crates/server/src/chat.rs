//! `POST /chat`: one conversational turn for the browser client.

use axum::{
    extract::State,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use pizzabot_agent::TurnContext;
use pizzabot_core::cart::Cart;
use pizzabot_core::domain::session::SessionId;
use pizzabot_core::errors::{ApplicationError, InterfaceError, InterfaceErrorKind};

use crate::sessions::AppState;

pub const SESSION_COOKIE: &str = "pizzabot_session";

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub cart: Cart,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub reply: String,
    pub cart: Cart,
}

/// Loads the session, runs the controller and stores the result, holding the
/// session's lock for the whole read-modify-write.
pub async fn converse(
    state: &AppState,
    turn: &TurnContext,
    text: &str,
) -> Result<TurnOutcome, ApplicationError> {
    let session_id = &turn.session_id;
    let _guard = state.locks.acquire(session_id.as_str()).await;
    let mut session = state.sessions.load(session_id).await?;

    let reply = state.controller.handle_turn(turn, &mut session, text).await;

    state.sessions.save(session_id, &session).await?;
    Ok(TurnOutcome { reply, cart: session.cart })
}

/// Opens a turn with a fresh correlation id.
pub fn new_turn(session_id: SessionId, actor: &str) -> TurnContext {
    TurnContext::new(session_id, Uuid::new_v4().to_string(), actor)
}

fn status_for(kind: InterfaceErrorKind) -> StatusCode {
    match kind {
        InterfaceErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        InterfaceErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let (token, minted) = match session_cookie(&headers) {
        Some(token) => (token, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    let turn = new_turn(SessionId(format!("web:{token}")), "web");

    let outcome = match converse(&state, &turn, &request.message).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let failure = InterfaceError::from_application(&error, turn.correlation_id());
            error!(
                event_name = "server.chat.turn_failed",
                session_id = %turn.session_id,
                correlation_id = %failure.correlation_id,
                error = %error,
                "turn aborted"
            );
            let body = ChatError {
                error: failure.user_message(),
                correlation_id: failure.correlation_id.clone(),
            };
            return (status_for(failure.kind), Json(body)).into_response();
        }
    };

    let mut response =
        Json(ChatResponse { response: outcome.reply, cart: outcome.cart }).into_response();
    if minted {
        let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

/// Session token from the `Cookie` header. Tokens with characters outside
/// `[A-Za-z0-9-]` are ignored and a new one is minted.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| {
            !value.is_empty()
                && value.len() <= 64
                && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use std::sync::Arc;

    use async_trait::async_trait;
    use pizzabot_core::domain::session::{SessionId, SessionState};
    use pizzabot_db::{RepositoryError, SessionStore};

    use super::{session_cookie, SESSION_COOKIE};
    use crate::routes::router;
    use crate::sessions::AppState;
    use crate::test_support::{app_state, chat_request};

    /// Every stored session fails to decode.
    struct CorruptStore;

    #[async_trait]
    impl SessionStore for CorruptStore {
        async fn load(&self, _id: &SessionId) -> Result<SessionState, RepositoryError> {
            Err(RepositoryError::Decode("step: unknown variant `dancing`".into()))
        }
        async fn save(
            &self,
            _id: &SessionId,
            _state: &SessionState,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }
        async fn purge_expired(&self) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    #[test]
    fn cookie_parsing_finds_the_session_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; pizzabot_session=abc-123; other=1"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc-123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("pizzabot_session=../etc"));
        assert_eq!(session_cookie(&headers), None);
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn first_turn_mints_a_session_cookie_and_welcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(app_state(dir.path()).await);

        let response = app.oneshot(chat_request("ciao", None)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .expect("set-cookie")
            .to_string();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));

        let body = json_body(response).await;
        assert!(body["response"].as_str().expect("response text").contains("Benvenuto"));
        assert_eq!(body["cart"], Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn cookie_keeps_the_cart_across_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(app_state(dir.path()).await);
        let cookie = "pizzabot_session=cart-test";

        for text in ["ciao", "vorrei una margherita"] {
            let response =
                app.clone().oneshot(chat_request(text, Some(cookie))).await.expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }

        let response = app.oneshot(chat_request("menu", Some(cookie))).await.expect("response");
        let body = json_body(response).await;
        let cart = body["cart"].as_array().expect("cart array");
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0]["name"], "Margherita");
    }

    #[tokio::test]
    async fn turns_are_written_to_the_chat_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(app_state(dir.path()).await);

        app.oneshot(chat_request("ciao", Some("pizzabot_session=journal")))
            .await
            .expect("response");

        let journal = std::fs::read_to_string(dir.path().join("chat.jsonl")).expect("chat log");
        let entry: Value =
            serde_json::from_str(journal.lines().next().expect("one line")).expect("json line");
        assert_eq!(entry["session_id"], "web:journal");
        assert_eq!(entry["user"], "ciao");
    }

    #[tokio::test]
    async fn missing_message_is_an_empty_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(app_state(dir.path()).await);
        let request = Request::post("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, "pizzabot_session=empty")
            .body(Body::from("{}"))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn corrupted_session_is_a_server_error_without_internals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState { sessions: Arc::new(CorruptStore), ..app_state(dir.path()).await };

        let response = router(state)
            .oneshot(chat_request("ciao", Some("pizzabot_session=broken")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["error"], "Si è verificato un errore interno.");
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(!body.to_string().contains("dancing"));
    }
}
