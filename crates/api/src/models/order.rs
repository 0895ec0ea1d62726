//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orchard_core::{CustomerId, OrderId, PaymentIntentId, PaymentStatus, ProductId};

/// A shipping address as submitted at checkout.
///
/// Carried opaquely through the payment metadata and stored verbatim on
/// the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A line item frozen at purchase time.
///
/// Intentionally decoupled from the live product row: later price or name
/// changes must not rewrite order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price at purchase time, in the store currency's major unit.
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// The payment outcome recorded on an order.
///
/// `id` links to the processor's payment intent and is the deduplication
/// key for materialization: the orders table enforces its uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub id: PaymentIntentId,
    pub status: PaymentStatus,
}

/// An order, created exactly once per completed payment intent.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment: PaymentResult,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: orchard_core::OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
