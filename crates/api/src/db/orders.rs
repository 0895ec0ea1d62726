//! Order repository for database operations.
//!
//! The `orders.payment_intent_id` UNIQUE constraint is the materializer's
//! exactly-once guard: insertion is insert-or-detect-conflict, never
//! read-then-write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use orchard_core::{CustomerId, OrderId, OrderStatus, PaymentIntentId, PaymentStatus};

use super::RepositoryError;
use crate::models::{Order, OrderItem, PaymentResult, ShippingAddress};

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

/// Input for creating an order from a verified payment.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_intent_id: PaymentIntentId,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    customer_id: i32,
    items: serde_json::Value,
    shipping_address: serde_json::Value,
    payment_intent_id: String,
    payment_status: PaymentStatus,
    subtotal: Decimal,
    shipping_fee: Decimal,
    tax: Decimal,
    total: Decimal,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let items: Vec<OrderItem> = serde_json::from_value(r.items).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid order items in database: {e}"))
        })?;
        let shipping_address: ShippingAddress = serde_json::from_value(r.shipping_address)
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid shipping address in database: {e}"))
            })?;

        Ok(Self {
            id: OrderId::new(r.id),
            customer_id: CustomerId::new(r.customer_id),
            items,
            shipping_address,
            payment: PaymentResult {
                id: PaymentIntentId::new(r.payment_intent_id),
                status: r.payment_status,
            },
            subtotal: r.subtotal,
            shipping_fee: r.shipping_fee,
            tax: r.tax,
            total: r.total,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = r"
    SELECT id, customer_id, items, shipping_address, payment_intent_id,
           payment_status, subtotal, shipping_fee, tax, total, status,
           created_at, updated_at
    FROM orders
";

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Get an order by the payment intent that produced it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_payment_intent(
        &self,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row =
            sqlx::query_as::<_, OrderRow>(&format!("{SELECT_COLUMNS} WHERE payment_intent_id = $1"))
                .bind(payment_intent_id.as_str())
                .fetch_optional(self.pool)
                .await?;

        row.map(Order::try_from).transpose()
    }

    /// List a customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_COLUMNS} WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Insert a new order in `pending` status with a succeeded payment.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if an order already exists for
    /// this payment intent - callers must treat that as "already
    /// processed", not as a failure.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn insert(&self, new_order: &NewOrder) -> Result<Order, RepositoryError> {
        let items = serde_json::to_value(&new_order.items).map_err(|e| {
            RepositoryError::DataCorruption(format!("failed to serialize order items: {e}"))
        })?;
        let shipping_address = serde_json::to_value(&new_order.shipping_address).map_err(|e| {
            RepositoryError::DataCorruption(format!("failed to serialize shipping address: {e}"))
        })?;

        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO orders (customer_id, items, shipping_address, payment_intent_id,
                                payment_status, subtotal, shipping_fee, tax, total, status)
            VALUES ($1, $2, $3, $4, 'succeeded', $5, $6, $7, $8, 'pending')
            RETURNING id, customer_id, items, shipping_address, payment_intent_id,
                      payment_status, subtotal, shipping_fee, tax, total, status,
                      created_at, updated_at
            ",
        )
        .bind(new_order.customer_id.as_i32())
        .bind(items)
        .bind(shipping_address)
        .bind(new_order.payment_intent_id.as_str())
        .bind(new_order.subtotal)
        .bind(new_order.shipping_fee)
        .bind(new_order.tax)
        .bind(new_order.total)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(format!(
                    "order already exists for payment intent {}",
                    new_order.payment_intent_id
                ));
            }
            RepositoryError::Database(e)
        })?;

        Order::try_from(row)
    }

    /// Advance an order's lifecycle status (administrative action).
    ///
    /// The transition check and the write share one transaction with the
    /// row locked, so two concurrent updates cannot both pass the check.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    /// Returns `RepositoryError::Conflict` if the transition is not a legal
    /// forward step.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(OrderStatus,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_i32())
                .fetch_optional(&mut *tx)
                .await?;

        let Some((current,)) = current else {
            return Err(RepositoryError::NotFound);
        };

        if !current.can_transition_to(next) {
            return Err(RepositoryError::Conflict(format!(
                "illegal status transition {current} -> {next}"
            )));
        }

        let row = sqlx::query_as::<_, OrderRow>(
            r"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, customer_id, items, shipping_address, payment_intent_id,
                      payment_status, subtotal, shipping_fee, tax, total, status,
                      created_at, updated_at
            ",
        )
        .bind(next)
        .bind(id.as_i32())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Order::try_from(row)
    }
}
