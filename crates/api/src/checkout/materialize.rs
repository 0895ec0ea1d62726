//! Order materializer: durable effects of a completed payment.
//!
//! Runs once per verified "payment succeeded" notification, but the
//! processor delivers at least once, so every step tolerates replay. The
//! unique constraint on `orders.payment_intent_id` is the single guard:
//! a conflict on insert means another delivery already won, and is
//! success, not failure.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use orchard_core::{OrderId, PaymentIntentId, ProductId};

use crate::config::CheckoutConfig;
use crate::db::orders::NewOrder;
use crate::db::{CartRepository, OrderRepository, ProductRepository, RepositoryError};
use crate::models::OrderItem;

use super::snapshot::{CheckoutSnapshot, SnapshotError};

/// Errors materializing a payment.
///
/// These are internal: the webhook route logs them and still acknowledges
/// the delivery, so the processor does not retry into a broken state.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The intent metadata is missing or unreadable - nothing to create
    /// an order from.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of materializing one notification.
#[derive(Debug, Clone)]
pub struct MaterializedOrder {
    pub order_id: OrderId,
    /// False when this delivery was a duplicate of an already-processed
    /// payment.
    pub created: bool,
    /// Lines whose conditional stock decrement did not apply because it
    /// would have driven stock negative. The order still exists; these
    /// need operator reconciliation (back-order, refund, restock).
    pub oversold: Vec<ProductId>,
}

/// Materialize a verified payment into an order, exactly once.
///
/// 1. Duplicate check by payment intent id (idempotent no-op).
/// 2. Insert the order from the snapshot embedded at intent-creation time;
///    an insert conflict is treated as "already processed".
/// 3. Conditionally decrement stock per line; failures are reported in the
///    outcome, never silently applied.
/// 4. Clear the customer's cart - server-driven, tied to order creation.
///
/// # Errors
///
/// Returns a [`MaterializeError`] if the snapshot is unreadable or the
/// database fails. Duplicate deliveries are not errors.
pub async fn materialize_payment(
    pool: &PgPool,
    checkout: &CheckoutConfig,
    payment_intent_id: &PaymentIntentId,
    metadata: &std::collections::HashMap<String, String>,
) -> Result<MaterializedOrder, MaterializeError> {
    let orders = OrderRepository::new(pool);

    if let Some(existing) = orders.get_by_payment_intent(payment_intent_id).await? {
        tracing::info!(
            payment_intent_id = %payment_intent_id,
            order_id = %existing.id,
            "duplicate payment notification, order already materialized"
        );
        return Ok(MaterializedOrder {
            order_id: existing.id,
            created: false,
            oversold: Vec::new(),
        });
    }

    let snapshot = CheckoutSnapshot::from_metadata(metadata)?;
    let items: Vec<OrderItem> = snapshot.items.iter().cloned().map(OrderItem::from).collect();

    let subtotal: Decimal = items
        .iter()
        .map(|item| item.unit_price * Decimal::from(item.quantity))
        .sum();
    // The snapshot carries only the charged total; shipping is the fixed
    // configured fee and tax is the remainder, so the parts always sum to
    // exactly what was charged.
    let shipping_fee = checkout.shipping_fee;
    let tax = snapshot.total - subtotal - shipping_fee;

    let new_order = NewOrder {
        customer_id: snapshot.customer_id,
        items,
        shipping_address: snapshot.shipping_address.clone(),
        payment_intent_id: payment_intent_id.clone(),
        subtotal,
        shipping_fee,
        tax,
        total: snapshot.total,
    };

    let order = match orders.insert(&new_order).await {
        Ok(order) => order,
        Err(RepositoryError::Conflict(_)) => {
            // Lost the race against a concurrent duplicate delivery.
            let existing = orders
                .get_by_payment_intent(payment_intent_id)
                .await?
                .ok_or_else(|| {
                    RepositoryError::DataCorruption(
                        "order insert conflicted but no order found".to_owned(),
                    )
                })?;
            tracing::info!(
                payment_intent_id = %payment_intent_id,
                order_id = %existing.id,
                "concurrent duplicate delivery, order already materialized"
            );
            return Ok(MaterializedOrder {
                order_id: existing.id,
                created: false,
                oversold: Vec::new(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let products = ProductRepository::new(pool);
    let mut oversold = Vec::new();
    for item in &order.items {
        let applied = products
            .decrement_stock(item.product_id, item.quantity)
            .await?;
        if !applied {
            tracing::warn!(
                order_id = %order.id,
                product_id = %item.product_id,
                quantity = item.quantity,
                "stock decrement skipped, would go negative; needs reconciliation"
            );
            oversold.push(item.product_id);
        }
    }

    let carts = CartRepository::new(pool);
    carts.clear(order.customer_id).await?;

    tracing::info!(
        payment_intent_id = %payment_intent_id,
        order_id = %order.id,
        oversold = oversold.len(),
        "order materialized"
    );

    Ok(MaterializedOrder {
        order_id: order.id,
        created: true,
        oversold,
    })
}
