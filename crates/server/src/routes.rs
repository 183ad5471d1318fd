use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::{chat, health, payments, sessions::AppState, whatsapp};

/// Every HTTP route. Paths without a handler fall through to the static
/// chat page directory.
pub fn router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/health", get(health::health))
        .route("/stripe-webhook", post(payments::stripe_webhook))
        .route("/webhook", get(whatsapp::verify).post(whatsapp::receive))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::router;
    use crate::test_support::app_state;

    #[tokio::test]
    async fn health_route_answers_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = router(app_state(dir.path()).await)
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 64).await.expect("body");
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn root_serves_the_chat_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = router(app_state(dir.path()).await)
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1 << 20).await.expect("body");
        assert!(String::from_utf8_lossy(&body).contains("messageInput"));
    }
}
