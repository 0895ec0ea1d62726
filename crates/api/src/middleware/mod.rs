//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Per-handler extractors ([`auth::RequireCustomer`], [`auth::RequireAdmin`])

pub mod auth;

pub use auth::{RequireAdmin, RequireCustomer};
