//! Checkout payment routes: intent creation and the processor webhook.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use orchard_core::{PaymentIntentId, ProductId};

use crate::checkout::intent::CartLineRequest;
use crate::checkout::{build_intent, materialize_payment};
use crate::error::Result;
use crate::middleware::RequireCustomer;
use crate::models::ShippingAddress;
use crate::payments::webhook::{self, WebhookError};
use crate::state::AppState;

/// Signature header set by the payment processor on webhook deliveries.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Body of `POST /payment/create-intent`.
///
/// Lines carry only a product reference and a quantity; any price a client
/// might send has nowhere to go.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub cart_items: Vec<CartItemRequest>,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product: ProductRef,
    pub quantity: i32,
}

/// Product reference in the shape the mobile client sends.
#[derive(Debug, Deserialize)]
pub struct ProductRef {
    #[serde(rename = "_id")]
    pub id: ProductId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub client_secret: String,
}

/// `POST /payment/create-intent` - validate the submitted cart and create
/// a payment intent.
#[instrument(skip(state, customer, request), fields(customer_id = %customer.id))]
pub async fn create_intent(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>> {
    let lines: Vec<CartLineRequest> = request
        .cart_items
        .iter()
        .map(|item| CartLineRequest {
            product_id: item.product.id,
            quantity: item.quantity,
        })
        .collect();

    let created = build_intent(
        state.pool(),
        state.payments(),
        &state.config().checkout,
        &customer,
        &lines,
        request.shipping_address,
    )
    .await?;

    Ok(Json(CreateIntentResponse {
        client_secret: created.client_secret,
    }))
}

/// `POST /payment/webhook` - signed payment notifications.
///
/// The raw body bytes are what was signed; this handler must never go
/// through a parsing extractor. A failed signature is the only error the
/// processor ever sees. Once the signature passes, internal failures are
/// logged and the delivery is acknowledged anyway, so the processor does
/// not retry into a broken state.
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
        return (
            StatusCode::BAD_REQUEST,
            WebhookError::MissingHeader.to_string(),
        )
            .into_response();
    };

    let secret = state.config().payment.webhook_secret.expose_secret();
    let event = match webhook::construct_event(
        &body,
        signature,
        secret.as_bytes(),
        webhook::DEFAULT_TOLERANCE,
    ) {
        Ok(event) => event,
        Err(WebhookError::InvalidPayload(e)) => {
            // Authenticated but unreadable; ack so the processor doesn't
            // retry a body that will never parse.
            tracing::error!(error = %e, "verified webhook body failed to parse");
            sentry::capture_message(
                &format!("verified webhook body failed to parse: {e}"),
                sentry::Level::Error,
            );
            return acknowledge();
        }
        Err(e) => {
            tracing::warn!(error = %e, "webhook signature verification failed");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let payment_intent_id = PaymentIntentId::new(event.data.object.id.clone());
            if let Err(e) = materialize_payment(
                state.pool(),
                &state.config().checkout,
                &payment_intent_id,
                &event.data.object.metadata,
            )
            .await
            {
                tracing::error!(
                    error = %e,
                    event_id = %event.id,
                    payment_intent_id = %payment_intent_id,
                    "failed to materialize order from payment notification"
                );
                sentry::capture_message(
                    &format!("order materialization failed for {payment_intent_id}: {e}"),
                    sentry::Level::Error,
                );
            }
        }
        other => {
            tracing::debug!(event_type = other, event_id = %event.id, "ignoring webhook event type");
        }
    }

    acknowledge()
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}
