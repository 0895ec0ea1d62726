//! Cart domain types.

use rust_decimal::Decimal;
use serde::Serialize;

use orchard_core::{CartId, CustomerId, ProductId};

/// A customer's cart.
///
/// Owned by exactly one customer and created lazily on first mutation.
/// Quantities are deduplicated per product. The cart never stores prices;
/// the line data here is joined from the live product table for display
/// only, and the intent builder always re-reads products itself.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Sum of live line prices, for display.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }
}

/// A cart line with its product joined in for display.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    /// Live product price. Display only, never trusted at checkout.
    pub price: Decimal,
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Live stock, so clients can warn before checkout.
    pub stock: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subtotal_sums_lines() {
        let cart = Cart {
            id: CartId::new(1),
            customer_id: CustomerId::new(1),
            items: vec![
                CartItem {
                    product_id: ProductId::new(1),
                    name: "Mug".to_string(),
                    price: dec!(12.50),
                    image_url: None,
                    quantity: 2,
                    stock: 10,
                },
                CartItem {
                    product_id: ProductId::new(2),
                    name: "Poster".to_string(),
                    price: dec!(8.00),
                    image_url: None,
                    quantity: 1,
                    stock: 3,
                },
            ],
        };
        assert_eq!(cart.subtotal(), dec!(33.00));
    }
}
