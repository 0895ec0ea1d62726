//! Money amounts with exact decimal arithmetic.
//!
//! Prices are stored and computed as [`rust_decimal::Decimal`] in the
//! currency's major unit (dollars, not cents). The payment processor is the
//! only consumer of minor units; conversion happens once, at the boundary,
//! via [`Money::to_minor_units`].

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting a money amount for the payment processor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount does not fit in an i64 number of minor units.
    #[error("amount out of range for minor units: {0}")]
    OutOfRange(Decimal),
}

/// A money amount in a single currency's major unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (e.g. dollars).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new money amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Convert to the processor's minor units (e.g. cents for USD).
    ///
    /// Rounds half-up to two decimal places first, so `$53.199` charges
    /// 5320 cents, matching how the amount is displayed to the customer.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::OutOfRange` if the scaled amount does not fit
    /// in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let cents = (self.amount * Decimal::ONE_HUNDRED).round();
        cents.to_i64().ok_or(MoneyError::OutOfRange(self.amount))
    }

    /// Build from a minor-unit amount reported by the processor.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(minor, 2),
            currency,
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency.code())
    }
}

/// ISO 4217 currency codes accepted at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl CurrencyCode {
    /// Uppercase ISO code, for display.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
        }
    }

    /// Lowercase code as the payment processor's API expects it.
    #[must_use]
    pub const fn processor_code(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Cad => "cad",
            Self::Aud => "aud",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "CAD" => Ok(Self::Cad),
            "AUD" => Ok(Self::Aud),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}
