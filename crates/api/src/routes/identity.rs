//! Identity-provider lifecycle webhook.
//!
//! The identity provider pushes `user.created` / `user.updated` /
//! `user.deleted` events to keep the local customer table in sync. The
//! deliveries are signed with the same header scheme as the payment
//! webhook, under a separate secret.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use orchard_core::ExternalId;

use crate::db::CustomerRepository;
use crate::payments::webhook::{self, DEFAULT_TOLERANCE};
use crate::state::AppState;

/// Signature header set by the identity provider.
const SIGNATURE_HEADER: &str = "identity-signature";

/// A parsed identity lifecycle event.
#[derive(Debug, Deserialize)]
struct IdentityEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: IdentityUser,
}

#[derive(Debug, Deserialize)]
struct IdentityUser {
    /// Subject issued by the identity provider.
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// `POST /identity/webhook` - signed identity lifecycle events.
///
/// Deliveries are at-least-once: the upsert and delete below are both
/// replay-safe. Failures after signature verification are logged and
/// acknowledged, matching the payment webhook's retry posture.
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing signature header").into_response();
    };

    let secret = state.config().identity_webhook_secret.expose_secret();
    if let Err(e) =
        webhook::verify_signature(&body, signature, secret.as_bytes(), DEFAULT_TOLERANCE)
    {
        tracing::warn!(error = %e, "identity webhook signature verification failed");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let event: IdentityEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "verified identity event failed to parse");
            sentry::capture_message(
                &format!("verified identity event failed to parse: {e}"),
                sentry::Level::Error,
            );
            return acknowledge();
        }
    };

    let customers = CustomerRepository::new(state.pool());
    let external_id = ExternalId::new(event.data.id.clone());

    let result = match event.event_type.as_str() {
        "user.created" | "user.updated" => customers
            .upsert_from_identity(
                &external_id,
                event.data.email.as_deref().unwrap_or_default(),
                event.data.name.as_deref().unwrap_or_default(),
                event.data.image_url.as_deref(),
            )
            .await
            .map(|customer| {
                tracing::info!(
                    customer_id = %customer.id,
                    external_id = %external_id,
                    "customer synced from identity event"
                );
            }),
        "user.deleted" => customers
            .delete_by_external_id(&external_id)
            .await
            .map(|deleted| {
                tracing::info!(
                    external_id = %external_id,
                    deleted,
                    "customer delete processed from identity event"
                );
            }),
        other => {
            tracing::debug!(event_type = other, "ignoring identity event type");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!(
            error = %e,
            event_type = %event.event_type,
            external_id = %external_id,
            "failed to apply identity event"
        );
        sentry::capture_message(
            &format!("failed to apply identity event {}: {e}", event.event_type),
            sentry::Level::Error,
        );
    }

    acknowledge()
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}
