//! Product domain type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use orchard_core::ProductId;

/// A product in the catalog.
///
/// `stock` is never negative: the database enforces a `stock >= 0` check
/// and the materializer only applies conditional decrements.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// Unit price in the store currency's major unit.
    pub price: Decimal,
    /// Units currently available for sale.
    pub stock: i32,
    pub category: String,
    /// Image URLs, already resolved by the image host.
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units could be sold right now.
    ///
    /// Advisory only: stock may change between this check and payment
    /// completion. Final enforcement happens at materialization.
    #[must_use]
    pub const fn has_stock_for(&self, quantity: i32) -> bool {
        self.stock >= quantity
    }
}
