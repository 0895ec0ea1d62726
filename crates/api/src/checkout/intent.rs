//! Intent builder: validate a cart and create a payment intent.
//!
//! Client-submitted prices and totals are never trusted; every line is
//! re-read from the catalog and the total is recomputed server-side. The
//! builder creates no order and mutates no product or cart - its only side
//! effect is the (idempotent) processor customer mapping.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use orchard_core::{Money, MoneyError, ProductId};

use crate::config::CheckoutConfig;
use crate::db::{CustomerRepository, ProductRepository, RepositoryError};
use crate::models::{Customer, Product, ShippingAddress};
use crate::payments::{CreateIntentParams, PaymentClient, PaymentError};

use super::snapshot::{CheckoutSnapshot, SnapshotError, SnapshotItem};

/// Errors surfaced synchronously to the checkout caller.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The submitted cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// A line references a quantity below one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// A referenced product no longer exists.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds current stock (advisory check).
    #[error("insufficient stock for {name}")]
    InsufficientStock { name: String },

    /// The recomputed total is not positive, or cannot be charged.
    #[error("invalid order total")]
    InvalidTotal,

    /// The validated cart doesn't fit the processor's metadata ceiling.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The payment processor call failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// A database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<MoneyError> for CheckoutError {
    fn from(_: MoneyError) -> Self {
        Self::InvalidTotal
    }
}

/// A client-submitted cart line: product reference plus quantity, nothing
/// price-shaped.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLineRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Server-side totals derived from validated lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Result of a successful intent build.
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    /// Handle the shopper's app uses to confirm the payment.
    pub client_secret: String,
}

/// Validate one line against its live product.
///
/// # Errors
///
/// Returns `InvalidQuantity` or `InsufficientStock`. The stock check is
/// advisory - final enforcement is the materializer's conditional
/// decrement.
pub fn validate_line(product: &Product, quantity: i32) -> Result<SnapshotItem, CheckoutError> {
    if quantity < 1 {
        return Err(CheckoutError::InvalidQuantity);
    }
    if !product.has_stock_for(quantity) {
        return Err(CheckoutError::InsufficientStock {
            name: product.name.clone(),
        });
    }

    Ok(SnapshotItem {
        product_id: product.id,
        name: product.name.clone(),
        unit_price: product.price,
        quantity,
    })
}

/// Compute totals from validated lines: subtotal plus a fixed shipping fee
/// plus `tax_rate` of the subtotal.
#[must_use]
pub fn price_order(items: &[SnapshotItem], shipping_fee: Decimal, tax_rate: Decimal) -> OrderTotals {
    let subtotal: Decimal = items
        .iter()
        .map(|item| item.unit_price * Decimal::from(item.quantity))
        .sum();
    let tax = subtotal * tax_rate;
    let total = subtotal + shipping_fee + tax;

    OrderTotals {
        subtotal,
        shipping_fee,
        tax,
        total,
    }
}

/// Build a payment intent for a customer's submitted cart.
///
/// Steps: re-read every product, validate quantity and (advisorily) stock,
/// recompute the total from server-side prices, resolve or lazily create
/// the processor customer, and attach the validated snapshot as intent
/// metadata. Returns the client secret; no order exists yet.
///
/// # Errors
///
/// Returns a [`CheckoutError`]; all variants map to synchronous 4xx/5xx
/// responses.
pub async fn build_intent(
    pool: &PgPool,
    payments: &PaymentClient,
    checkout: &CheckoutConfig,
    customer: &Customer,
    lines: &[CartLineRequest],
    shipping_address: ShippingAddress,
) -> Result<CreatedIntent, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let products = ProductRepository::new(pool);
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products
            .get_by_id(line.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
        items.push(validate_line(&product, line.quantity)?);
    }

    let totals = price_order(&items, checkout.shipping_fee, checkout.tax_rate);
    if totals.total <= Decimal::ZERO {
        return Err(CheckoutError::InvalidTotal);
    }

    let processor_customer = resolve_processor_customer(pool, payments, customer).await?;

    let snapshot = CheckoutSnapshot {
        customer_id: customer.id,
        items,
        shipping_address,
        total: totals.total,
    };
    let metadata = snapshot.to_metadata()?;

    let amount_minor = Money::new(totals.total, checkout.currency).to_minor_units()?;
    let intent = payments
        .create_intent(CreateIntentParams {
            amount_minor,
            currency: checkout.currency,
            customer: processor_customer,
            metadata,
        })
        .await?;

    tracing::info!(
        customer_id = %customer.id,
        payment_intent_id = %intent.id,
        amount_minor,
        "created payment intent"
    );

    Ok(CreatedIntent {
        client_secret: intent.client_secret,
    })
}

/// Resolve the customer's processor mapping, creating it on first use.
///
/// The cached mapping is reused and never overwritten; under a concurrent
/// first checkout, whichever mapping lands first wins and the other
/// processor customer is simply abandoned.
async fn resolve_processor_customer(
    pool: &PgPool,
    payments: &PaymentClient,
    customer: &Customer,
) -> Result<orchard_core::ProcessorCustomerId, CheckoutError> {
    if let Some(existing) = &customer.processor_customer_id {
        return Ok(existing.clone());
    }

    let created = payments
        .create_customer(&customer.email, &customer.name, customer.external_id.as_str())
        .await?;

    let customers = CustomerRepository::new(pool);
    let canonical = customers
        .cache_processor_customer(customer.id, &created)
        .await?;

    Ok(canonical)
}
