//! Integration tests for Orchard.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and run migrations
//! sqlx migrate run --source crates/api/migrations
//!
//! # Start the API server
//! cargo run -p orchard-api
//!
//! # Run integration tests
//! cargo test -p orchard-integration-tests -- --ignored
//! ```
//!
//! The tests talk to a live server over HTTP and sign their own webhook
//! deliveries, so the server's `PAYMENT_WEBHOOK_SECRET` and
//! `IDENTITY_WEBHOOK_SECRET` must match the test environment.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Base URL for the API (configurable via environment).
#[must_use]
pub fn base_url() -> String {
    std::env::var("ORCHARD_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Admin bearer token the server was started with.
#[must_use]
pub fn admin_token() -> String {
    std::env::var("ORCHARD_ADMIN_TOKEN").expect("ORCHARD_ADMIN_TOKEN must be set")
}

/// Webhook signing secret shared with the server.
#[must_use]
pub fn webhook_secret(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| panic!("{var} must be set"))
}

/// Header the gateway uses to forward the verified customer identity.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-external-id";

/// Sign a webhook payload the way the processor does: `t=<unix>,v1=<hex>`
/// over `"{t}.{body}"`.
///
/// # Panics
///
/// Panics if the secret is empty (HMAC keys accept any length, so only a
/// broken environment can trigger this).
#[must_use]
pub fn sign_webhook(payload: &[u8], timestamp: i64, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

/// Current unix time in seconds.
///
/// # Panics
///
/// Panics if the system clock is before the unix epoch.
#[must_use]
pub fn now_unix() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before unix epoch")
            .as_secs(),
    )
    .expect("timestamp fits in i64")
}
