//! Payment webhook verification.
//!
//! The provider signs `"<timestamp>.<raw body>"` with HMAC-SHA256 and sends
//! `t=<unix seconds>,v1=<hex digest>[,v1=...]` in the signature header.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature header is malformed: {0}")]
    MalformedHeader(String),
    #[error("signature timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,
    #[error("no signature matches the payload")]
    Mismatch,
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("event payload is invalid: {0}")]
    InvalidPayload(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: PaymentEventData,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

impl PaymentEvent {
    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }
}

#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(SignatureError::MalformedHeader(format!("segment `{part}` has no `=`")));
        };
        match key {
            "t" => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    SignatureError::MalformedHeader(format!("timestamp `{value}` is not a number"))
                })?;
                timestamp = Some(parsed);
            }
            "v1" => signatures.push(decode_hex(value)?),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::MalformedHeader("missing `t=`".to_string()))?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader("missing `v1=`".to_string()));
    }
    Ok(SignatureHeader { timestamp, signatures })
}

pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let header = parse_header(header.ok_or(SignatureError::MissingHeader)?)?;

    let age = now.timestamp().saturating_sub(header.timestamp).unsigned_abs();
    if age > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let signed = signed_payload(header.timestamp, payload);
    let matched = header.signatures.iter().any(|candidate| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(&signed);
        mac.verify_slice(candidate).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, SignatureError> {
    serde_json::from_slice(payload).map_err(|error| SignatureError::InvalidPayload(error.to_string()))
}

/// Verifies the signature, then decodes the event.
pub fn construct_event(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> Result<PaymentEvent, SignatureError> {
    verify_signature(payload, header, secret, tolerance_secs, now)?;
    parse_event(payload)
}

/// Produces a header value the way the provider does.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let digest = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(&signed_payload(timestamp, payload));
            encode_hex(mac.finalize().into_bytes().as_slice())
        }
        Err(_) => String::new(),
    };
    format!("t={timestamp},v1={digest}")
}

fn signed_payload(timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    signed
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Result<Vec<u8>, SignatureError> {
    if value.len() % 2 != 0 {
        return Err(SignatureError::MalformedHeader("signature has odd length".to_string()));
    }
    (0..value.len())
        .step_by(2)
        .map(|index| {
            value
                .get(index..index + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| SignatureError::MalformedHeader("signature is not hex".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{construct_event, sign_payload, verify_signature, SignatureError};

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"amount_total":1650}}}"#;

    #[test]
    fn valid_signature_yields_event() {
        let now = Utc::now();
        let header = sign_payload(SECRET, now.timestamp(), BODY);

        let event = construct_event(BODY, Some(&header), SECRET, 300, now).expect("valid event");

        assert!(event.is_checkout_completed());
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.data.object["amount_total"], 1650);
    }

    #[test]
    fn tampered_body_is_rejected() {
        let now = Utc::now();
        let header = sign_payload(SECRET, now.timestamp(), BODY);
        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

        assert_eq!(
            verify_signature(tampered, Some(&header), SECRET, 300, now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(BODY, Some(&header), "whsec_other", 300, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_and_bad_headers_are_rejected() {
        let now = Utc::now();
        let stale = sign_payload(SECRET, (now - Duration::minutes(10)).timestamp(), BODY);

        assert_eq!(
            verify_signature(BODY, Some(&stale), SECRET, 300, now),
            Err(SignatureError::TimestampOutOfTolerance)
        );
        assert_eq!(verify_signature(BODY, None, SECRET, 300, now), Err(SignatureError::MissingHeader));
        assert!(matches!(
            verify_signature(BODY, Some("t=abc,v1=00"), SECRET, 300, now),
            Err(SignatureError::MalformedHeader(_))
        ));
        assert!(matches!(
            verify_signature(BODY, Some(&format!("t={}", now.timestamp())), SECRET, 300, now),
            Err(SignatureError::MalformedHeader(_))
        ));
        assert_eq!(
            verify_signature(BODY, Some(&stale), "", 300, now),
            Err(SignatureError::MissingSecret)
        );
    }

    #[test]
    fn signed_garbage_is_an_invalid_payload() {
        let now = Utc::now();
        let body = b"not json";
        let header = sign_payload(SECRET, now.timestamp(), body);

        assert!(matches!(
            construct_event(body, Some(&header), SECRET, 300, now),
            Err(SignatureError::InvalidPayload(_))
        ));
    }
}
