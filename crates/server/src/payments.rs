//! `POST /stripe-webhook`: verifies the provider signature and records
//! completed checkouts. Session state is never touched here.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use pizzabot_core::payments::{construct_event, PaymentEvent, SignatureError};

use crate::sessions::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    match verify(&state, &headers, &body) {
        Ok(event) => {
            if event.is_checkout_completed() {
                info!(
                    event_name = "payments.checkout_completed",
                    correlation_id = %event.id,
                    payment = %event.data.object,
                    "payment completed"
                );
            } else {
                debug!(
                    event_name = "payments.event_ignored",
                    correlation_id = %event.id,
                    event_type = %event.event_type,
                    "payment event ignored"
                );
            }
            (StatusCode::OK, "OK")
        }
        Err(error) => {
            warn!(event_name = "payments.webhook_rejected", error = %error, "webhook rejected");
            (StatusCode::BAD_REQUEST, "Error")
        }
    }
}

fn verify(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<PaymentEvent, SignatureError> {
    let payments = &state.config.payments;
    let secret = payments.webhook_secret.as_ref().ok_or(SignatureError::MissingSecret)?;
    let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    construct_event(body, header, secret.expose_secret(), payments.tolerance_secs, Utc::now())
}
