//! Authentication extractors.
//!
//! The API sits behind an identity gateway that verifies the shopper's
//! session token and forwards the stable external id in the
//! `x-customer-external-id` header. [`RequireCustomer`] trusts that header
//! and resolves it to a local customer row.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;

use orchard_core::ExternalId;

use crate::db::CustomerRepository;
use crate::models::Customer;
use crate::state::AppState;

/// Header carrying the gateway-verified external customer id.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-external-id";

/// Extractor that requires an authenticated customer.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     RequireCustomer(customer): RequireCustomer,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", customer.name)
/// }
/// ```
pub struct RequireCustomer(pub Customer);

/// Error returned when authentication is required but missing or invalid.
pub enum AuthRejection {
    /// No verified identity header, or no matching customer.
    Unauthorized(&'static str),
    /// The customer lookup itself failed.
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireCustomer {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let external_id = parts
            .headers
            .get(CUSTOMER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(AuthRejection::Unauthorized("Not authenticated"))?;

        let customers = CustomerRepository::new(state.pool());
        let customer = customers
            .get_by_external_id(&ExternalId::new(external_id))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "customer lookup failed during auth");
                AuthRejection::Internal
            })?
            .ok_or(AuthRejection::Unauthorized("Unknown customer"))?;

        Ok(Self(customer))
    }
}

/// Extractor that requires the admin bearer token.
///
/// Guards operator-only routes such as order status updates.
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthRejection::Unauthorized("Missing admin token"))?;

        let expected = state.config().admin_token.expose_secret();
        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            return Err(AuthRejection::Unauthorized("Invalid admin token"));
        }

        Ok(Self)
    }
}

/// Compare two byte slices without short-circuiting on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret-token", b"secret-token"));
        assert!(!constant_time_eq(b"secret-token", b"secret-tokex"));
        assert!(!constant_time_eq(b"secret", b"secret-token"));
        assert!(constant_time_eq(b"", b""));
    }
}
