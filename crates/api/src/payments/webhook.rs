//! Webhook signature verification and event parsing.
//!
//! Notifications arrive with a signature header of the form
//! `t=<unix seconds>,v1=<hex hmac>` where the MAC is HMAC-SHA256 over
//! `"{t}.{raw body}"` keyed with the endpoint's shared secret. Verification
//! runs over the exact bytes received - the route must extract the raw
//! body, never a parsed one - and must pass before any business logic.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How far a notification's timestamp may drift from our clock.
///
/// Bounds replay of a captured delivery without breaking slow retries.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Errors verifying or parsing a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header missing from the request.
    #[error("missing signature header")]
    MissingHeader,

    /// Signature header present but not in `t=...,v1=...` form.
    #[error("malformed signature header")]
    MalformedHeader,

    /// No candidate signature matched the payload.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Timestamp outside the allowed tolerance window.
    #[error("timestamp outside tolerance window")]
    TimestampOutOfTolerance,

    /// Body failed to parse after the signature was verified.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// A parsed notification from the payment processor.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

/// The payment object embedded in a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    /// The metadata map the intent builder attached at creation time.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Verify a delivery's signature, then parse it into a [`WebhookEvent`].
///
/// # Errors
///
/// Returns a [`WebhookError`] if the signature is missing, malformed,
/// stale, or wrong, or if the verified body fails to parse.
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    tolerance: Duration,
) -> Result<WebhookEvent, WebhookError> {
    verify_signature_at(payload, signature_header, secret, tolerance, Utc::now().timestamp())?;
    Ok(serde_json::from_slice(payload)?)
}

/// Verify the signature header against the raw payload.
///
/// # Errors
///
/// Returns a [`WebhookError`] if verification fails.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    tolerance: Duration,
) -> Result<(), WebhookError> {
    verify_signature_at(payload, signature_header, secret, tolerance, Utc::now().timestamp())
}

fn verify_signature_at(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
    tolerance: Duration,
    now_unix: i64,
) -> Result<(), WebhookError> {
    let header = SignatureHeader::parse(signature_header)?;

    let age = now_unix.saturating_sub(header.timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    // The header may carry several v1 candidates during secret rotation;
    // any match passes. verify_slice compares in constant time.
    for candidate in &header.signatures {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| WebhookError::SignatureMismatch)?;
        // MAC over "{t}.{body}" binds the timestamp to the payload.
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::SignatureMismatch)
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(WebhookError::MalformedHeader);
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader)?,
                    );
                }
                "v1" => {
                    signatures
                        .push(hex::decode(value).map_err(|_| WebhookError::MalformedHeader)?);
                }
                // Other schemes (v0 etc.) are ignored, not rejected.
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64, secret: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);

        verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE, now).unwrap();
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = sign(payload, now, b"whsec_other");

        let err =
            verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE, now).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = br#"{"amount":100}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);

        let err = verify_signature_at(br#"{"amount":999}"#, &header, SECRET, DEFAULT_TOLERANCE, now)
            .unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let signed_at = 1_700_000_000;
        let header = sign(payload, signed_at, SECRET);

        let err = verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE, signed_at + 301)
            .unwrap_err();
        assert!(matches!(err, WebhookError::TimestampOutOfTolerance));
    }

    #[test]
    fn test_rotation_second_candidate_accepted() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let good = sign(payload, now, SECRET);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={now},v1={},v1={good_sig}", hex::encode([0u8; 32]));

        verify_signature_at(payload, &header, SECRET, DEFAULT_TOLERANCE, now).unwrap();
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let payload = b"{}";
        for header in ["", "t=notanumber,v1=abcd", "v1=abcd", "t=123", "t=123,v1=zz"] {
            let err = verify_signature_at(payload, header, SECRET, DEFAULT_TOLERANCE, 123)
                .unwrap_err();
            assert!(
                matches!(err, WebhookError::MalformedHeader),
                "header {header:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_construct_event_parses_metadata() {
        let payload = br#"{
            "id": "evt_42",
            "type": "payment_intent.succeeded",
            "data": {
                "object": {
                    "id": "pi_42",
                    "customer": "cus_9",
                    "metadata": {"total_price": "53.20"}
                }
            }
        }"#;
        let now = Utc::now().timestamp();
        let header = sign(payload, now, SECRET);

        let event = construct_event(payload, &header, SECRET, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object.id, "pi_42");
        assert_eq!(
            event.data.object.metadata.get("total_price").map(String::as_str),
            Some("53.20")
        );
    }
}
