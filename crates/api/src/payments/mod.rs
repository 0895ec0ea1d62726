//! Payment processor client.
//!
//! A thin client over the processor's REST API (Stripe-compatible,
//! form-encoded). The client is constructed once, held in [`crate::state::AppState`],
//! and passed explicitly into the checkout pipeline - there is no global
//! instance. Calls carry a bounded timeout and are never retried here;
//! intent-creation failures surface synchronously to the caller and webhook
//! redelivery is the processor's job.

pub mod webhook;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use orchard_core::{CurrencyCode, PaymentIntentId, ProcessorCustomerId};

use crate::config::PaymentConfig;

/// Errors that can occur when talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed (network, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor returned an error response.
    #[error("processor error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to build the request or parse the response.
    #[error("parse error: {0}")]
    Parse(String),
}

/// A created payment intent, as returned by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Client-usable secret the shopper's app confirms the payment with.
    pub client_secret: String,
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    /// Amount in the currency's minor unit (e.g. cents).
    pub amount_minor: i64,
    pub currency: CurrencyCode,
    pub customer: ProcessorCustomerId,
    /// Opaque string metadata attached to the intent. Each value must fit
    /// the processor's per-field ceiling; see `checkout::snapshot`.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProcessorCustomer {
    id: String,
}

/// Client for the payment processor's REST API.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    base_url: String,
}

impl PaymentClient {
    /// Create a new payment processor client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaymentError::Parse(format!("invalid secret key format: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base.clone(),
        })
    }

    /// Create a processor customer record for a shop customer.
    ///
    /// Called at most once per customer in practice; the resulting id is
    /// cached on the customer row and reused on later checkouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the processor rejects it.
    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        external_id: &str,
    ) -> Result<ProcessorCustomerId, PaymentError> {
        let url = format!("{}/v1/customers", self.base_url);

        let form = vec![
            ("email".to_owned(), email.to_owned()),
            ("name".to_owned(), name.to_owned()),
            ("metadata[external_id]".to_owned(), external_id.to_owned()),
        ];

        let response = self.client.post(&url).form(&form).send().await?;
        let customer: ProcessorCustomer = Self::parse_response(response).await?;

        Ok(ProcessorCustomerId::new(customer.id))
    }

    /// Create a payment intent for a validated checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the processor rejects it.
    pub async fn create_intent(
        &self,
        params: CreateIntentParams,
    ) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents", self.base_url);

        let mut form = vec![
            ("amount".to_owned(), params.amount_minor.to_string()),
            (
                "currency".to_owned(),
                params.currency.processor_code().to_owned(),
            ),
            ("customer".to_owned(), params.customer.as_str().to_owned()),
            (
                "automatic_payment_methods[enabled]".to_owned(),
                "true".to_owned(),
            ),
        ];
        for (key, value) in params.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self.client.post(&url).form(&form).send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}
