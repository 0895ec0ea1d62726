//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORCHARD_DATABASE_URL` - `PostgreSQL` connection string
//! - `PAYMENT_SECRET_KEY` - Payment processor API secret key
//! - `PAYMENT_WEBHOOK_SECRET` - Payment webhook signing secret
//! - `IDENTITY_WEBHOOK_SECRET` - Identity-provider webhook signing secret
//! - `ORCHARD_ADMIN_TOKEN` - Bearer token for admin-only routes
//!
//! ## Optional
//! - `ORCHARD_HOST` - Bind address (default: 127.0.0.1)
//! - `ORCHARD_PORT` - Listen port (default: 3000)
//! - `PAYMENT_API_BASE` - Processor API base URL (default: https://api.stripe.com)
//! - `PAYMENT_TIMEOUT_SECS` - Outbound call timeout (default: 10)
//! - `CHECKOUT_CURRENCY` - ISO currency code (default: USD)
//! - `CHECKOUT_SHIPPING_FEE` - Flat shipping fee (default: 10.00)
//! - `CHECKOUT_TAX_RATE` - Flat tax rate on the subtotal (default: 0.08)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use orchard_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Orchard API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Payment processor configuration
    pub payment: PaymentConfig,
    /// Checkout pricing constants
    pub checkout: CheckoutConfig,
    /// Identity-provider webhook signing secret
    pub identity_webhook_secret: SecretString,
    /// Bearer token required on admin-only routes
    pub admin_token: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name (e.g. production, staging)
    pub sentry_environment: Option<String>,
}

/// Payment processor configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Processor API secret key (server-side only)
    pub secret_key: SecretString,
    /// Webhook signing secret shared with the processor
    pub webhook_secret: SecretString,
    /// Processor API base URL (overridable for tests)
    pub api_base: String,
    /// Timeout for outbound processor calls, in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Checkout pricing constants.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    /// Store currency
    pub currency: CurrencyCode,
    /// Flat shipping fee added to every order
    pub shipping_fee: Decimal,
    /// Flat tax rate applied to the subtotal
    pub tax_rate: Decimal,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ORCHARD_DATABASE_URL")?;
        let host = get_env_or_default("ORCHARD_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORCHARD_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ORCHARD_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORCHARD_PORT".to_string(), e.to_string()))?;

        let payment = PaymentConfig::from_env()?;
        let checkout = CheckoutConfig::from_env()?;
        let identity_webhook_secret = get_validated_secret("IDENTITY_WEBHOOK_SECRET")?;
        let admin_token = get_validated_secret("ORCHARD_ADMIN_TOKEN")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            payment,
            checkout,
            identity_webhook_secret,
            admin_token,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = get_env_or_default("PAYMENT_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("PAYMENT_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            secret_key: get_validated_secret("PAYMENT_SECRET_KEY")?,
            webhook_secret: get_validated_secret("PAYMENT_WEBHOOK_SECRET")?,
            api_base: get_env_or_default("PAYMENT_API_BASE", "https://api.stripe.com"),
            timeout_secs,
        })
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("CHECKOUT_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("CHECKOUT_CURRENCY".to_string(), e))?;
        let shipping_fee = get_env_or_default("CHECKOUT_SHIPPING_FEE", "10.00")
            .parse::<Decimal>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CHECKOUT_SHIPPING_FEE".to_string(), e.to_string())
            })?;
        let tax_rate = get_env_or_default("CHECKOUT_TAX_RATE", "0.08")
            .parse::<Decimal>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CHECKOUT_TAX_RATE".to_string(), e.to_string())
            })?;

        if shipping_fee < Decimal::ZERO {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_SHIPPING_FEE".to_string(),
                "must not be negative".to_string(),
            ));
        }
        if tax_rate < Decimal::ZERO || tax_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar(
                "CHECKOUT_TAX_RATE".to_string(),
                "must be in [0, 1)".to_string(),
            ));
        }

        Ok(Self {
            currency,
            shipping_fee,
            tax_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InsecureSecret(_, _)
        ));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_payment_config_debug_redacts_secrets() {
        let config = PaymentConfig {
            secret_key: SecretString::from("sk_live_very_secret"),
            webhook_secret: SecretString::from("whsec_very_secret"),
            api_base: "https://api.stripe.com".to_string(),
            timeout_secs: 10,
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("https://api.stripe.com"));
        assert!(!debug_output.contains("sk_live_very_secret"));
        assert!(!debug_output.contains("whsec_very_secret"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            payment: PaymentConfig {
                secret_key: SecretString::from("sk"),
                webhook_secret: SecretString::from("whsec"),
                api_base: "https://api.stripe.com".to_string(),
                timeout_secs: 10,
            },
            checkout: CheckoutConfig {
                currency: CurrencyCode::Usd,
                shipping_fee: dec!(10.00),
                tax_rate: dec!(0.08),
            },
            identity_webhook_secret: SecretString::from("idsec"),
            admin_token: SecretString::from("admintoken"),
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}
