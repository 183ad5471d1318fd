//! WhatsApp Cloud API webhook. Inbound texts run through the controller
//! under the key `whatsapp:<sender>`; replies are logged, not sent.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{error, info, warn};

use pizzabot_core::domain::session::SessionId;

use crate::chat::{converse, new_turn};
use crate::sessions::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    body: String,
}

impl WebhookPayload {
    /// `(sender, text)` for every text message; media and status updates
    /// are skipped.
    fn text_messages(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .flat_map(|change| &change.value.messages)
            .filter_map(|message| {
                let text = message.text.as_ref()?;
                Some((message.from.as_str(), text.body.as_str()))
            })
    }
}

pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    let expected = state.config.whatsapp.verify_token.as_ref();
    let matches = match (expected, params.verify_token.as_deref()) {
        (Some(expected), Some(given)) => expected.expose_secret() == given,
        _ => false,
    };
    if !matches {
        warn!(
            event_name = "whatsapp.verify_failed",
            mode = params.mode.as_deref().unwrap_or(""),
            "webhook verification failed"
        );
        return (StatusCode::FORBIDDEN, "Verification failed".to_string());
    }
    (StatusCode::OK, params.challenge.unwrap_or_default())
}

pub async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, &'static str) {
    for (from, text) in payload.text_messages() {
        let turn = new_turn(SessionId(format!("whatsapp:{from}")), "whatsapp");
        match converse(&state, &turn, text).await {
            Ok(outcome) => info!(
                event_name = "whatsapp.reply_ready",
                session_id = %turn.session_id,
                correlation_id = %turn.correlation_id(),
                reply = %outcome.reply,
                "reply composed"
            ),
            Err(error) => error!(
                event_name = "whatsapp.turn_failed",
                session_id = %turn.session_id,
                correlation_id = %turn.correlation_id(),
                error = %error,
                "turn aborted"
            ),
        }
    }
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use secrecy::SecretString;
    use tower::ServiceExt;

    use pizzabot_core::domain::session::{DialogueStep, SessionId};

    use super::WebhookPayload;
    use crate::routes::router;
    use crate::test_support::app_state_with;

    const PAYLOAD: &str = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [
                        {"from": "393331234567", "type": "text", "text": {"body": "ciao"}},
                        {"from": "393331234567", "type": "image", "image": {"id": "x"}}
                    ]
                }
            }, {
                "value": {"statuses": [{"id": "wamid.1"}]}
            }]
        }]
    }"#;

    #[test]
    fn only_text_messages_are_extracted() {
        let payload: WebhookPayload = serde_json::from_str(PAYLOAD).expect("payload");
        let messages: Vec<_> = payload.text_messages().collect();
        assert_eq!(messages, vec![("393331234567", "ciao")]);
    }

    #[tokio::test]
    async fn handshake_echoes_the_challenge_only_with_the_right_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = app_state_with(dir.path(), |config| {
            config.whatsapp.verify_token = Some(SecretString::from("segreto".to_string()));
        })
        .await;
        let app = router(state);

        let ok = app
            .clone()
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=segreto&hub.challenge=42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);
        let body = to_bytes(ok.into_body(), 1024).await.expect("body");
        assert_eq!(&body[..], b"42");

        let denied = app
            .oneshot(
                Request::get("/webhook?hub.verify_token=sbagliato&hub.challenge=42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inbound_text_advances_the_sender_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = app_state_with(dir.path(), |_| {}).await;
        let app = router(state.clone());

        let response = app
            .oneshot(
                Request::post("/webhook")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(PAYLOAD))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let session = state
            .sessions
            .load(&SessionId("whatsapp:393331234567".into()))
            .await
            .expect("load session");
        assert_eq!(session.step, DialogueStep::Ordering);
        assert_eq!(session.history.len(), 2);
    }
}
