//! The validated line-item snapshot carried through payment metadata.
//!
//! The intent builder serializes validated lines, the shipping address and
//! the total into the payment intent's string metadata; the materializer
//! reads the same snapshot back when the payment completes. The snapshot -
//! not the live catalog - is the source of truth for order creation.
//!
//! Field names inside items are deliberately terse (`p`, `n`, `pr`, `q`)
//! because the processor caps each metadata value; the cap also bounds how
//! many line items a single checkout can carry.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orchard_core::{CustomerId, ProductId};

use crate::models::{OrderItem, ShippingAddress};

/// The processor's per-value metadata ceiling, in characters.
pub const METADATA_VALUE_LIMIT: usize = 500;

/// Metadata keys used on the payment intent.
pub mod keys {
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const ORDER_ITEMS: &str = "order_items";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const TOTAL_PRICE: &str = "total_price";
}

/// Errors building or reading a checkout snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A serialized field exceeds the processor's metadata ceiling.
    #[error("snapshot field '{field}' is {len} chars, over the {METADATA_VALUE_LIMIT} limit")]
    FieldTooLarge { field: &'static str, len: usize },

    /// A required metadata key is missing from the notification.
    #[error("snapshot missing metadata key '{0}'")]
    MissingField(&'static str),

    /// A metadata value failed to parse.
    #[error("snapshot field '{field}' is invalid: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// One validated line, in the compact metadata form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    /// Product id.
    #[serde(rename = "p")]
    pub product_id: ProductId,
    /// Product name at validation time.
    #[serde(rename = "n")]
    pub name: String,
    /// Server-side unit price at validation time.
    #[serde(rename = "pr")]
    pub unit_price: Decimal,
    /// Requested quantity.
    #[serde(rename = "q")]
    pub quantity: i32,
}

impl From<SnapshotItem> for OrderItem {
    fn from(item: SnapshotItem) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name,
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

/// Everything the materializer needs to create the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSnapshot {
    pub customer_id: CustomerId,
    pub items: Vec<SnapshotItem>,
    pub shipping_address: ShippingAddress,
    pub total: Decimal,
}

impl CheckoutSnapshot {
    /// Serialize into the processor's string metadata map.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::FieldTooLarge` if a serialized value exceeds
    /// the processor ceiling - the checkout must be rejected, not
    /// truncated.
    pub fn to_metadata(&self) -> Result<HashMap<String, String>, SnapshotError> {
        let items = serde_json::to_string(&self.items).map_err(|e| {
            SnapshotError::InvalidField {
                field: keys::ORDER_ITEMS,
                message: e.to_string(),
            }
        })?;
        let address = serde_json::to_string(&self.shipping_address).map_err(|e| {
            SnapshotError::InvalidField {
                field: keys::SHIPPING_ADDRESS,
                message: e.to_string(),
            }
        })?;

        for (field, value) in [
            (keys::ORDER_ITEMS, &items),
            (keys::SHIPPING_ADDRESS, &address),
        ] {
            if value.chars().count() > METADATA_VALUE_LIMIT {
                return Err(SnapshotError::FieldTooLarge {
                    field,
                    len: value.chars().count(),
                });
            }
        }

        Ok(HashMap::from([
            (
                keys::CUSTOMER_ID.to_owned(),
                self.customer_id.as_i32().to_string(),
            ),
            (keys::ORDER_ITEMS.to_owned(), items),
            (keys::SHIPPING_ADDRESS.to_owned(), address),
            (keys::TOTAL_PRICE.to_owned(), self.total.to_string()),
        ]))
    }

    /// Parse the snapshot back out of a notification's metadata map.
    ///
    /// # Errors
    ///
    /// Returns a `SnapshotError` if a key is missing or a value fails to
    /// parse.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, SnapshotError> {
        let customer_id = get(metadata, keys::CUSTOMER_ID)?
            .parse::<i32>()
            .map(CustomerId::new)
            .map_err(|e| SnapshotError::InvalidField {
                field: keys::CUSTOMER_ID,
                message: e.to_string(),
            })?;

        let items: Vec<SnapshotItem> = serde_json::from_str(get(metadata, keys::ORDER_ITEMS)?)
            .map_err(|e| SnapshotError::InvalidField {
                field: keys::ORDER_ITEMS,
                message: e.to_string(),
            })?;

        // A non-positive quantity would turn the materializer's stock
        // decrement into an increment. The builder never emits one; a
        // snapshot carrying one is corrupt.
        if let Some(item) = items.iter().find(|item| item.quantity < 1) {
            return Err(SnapshotError::InvalidField {
                field: keys::ORDER_ITEMS,
                message: format!(
                    "quantity {} for product {} is below 1",
                    item.quantity, item.product_id
                ),
            });
        }

        let shipping_address: ShippingAddress =
            serde_json::from_str(get(metadata, keys::SHIPPING_ADDRESS)?).map_err(|e| {
                SnapshotError::InvalidField {
                    field: keys::SHIPPING_ADDRESS,
                    message: e.to_string(),
                }
            })?;

        let total = get(metadata, keys::TOTAL_PRICE)?
            .parse::<Decimal>()
            .map_err(|e| SnapshotError::InvalidField {
                field: keys::TOTAL_PRICE,
                message: e.to_string(),
            })?;

        Ok(Self {
            customer_id,
            items,
            shipping_address,
            total,
        })
    }
}

fn get<'m>(
    metadata: &'m HashMap<String, String>,
    key: &'static str,
) -> Result<&'m String, SnapshotError> {
    metadata.get(key).ok_or(SnapshotError::MissingField(key))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            line1: "12 Analytical Way".to_string(),
            line2: None,
            city: "London".to_string(),
            state: "LDN".to_string(),
            postal_code: "EC1A".to_string(),
            country: "GB".to_string(),
        }
    }

    fn snapshot() -> CheckoutSnapshot {
        CheckoutSnapshot {
            customer_id: CustomerId::new(7),
            items: vec![SnapshotItem {
                product_id: ProductId::new(3),
                name: "Enamel Mug".to_string(),
                unit_price: dec!(20.00),
                quantity: 2,
            }],
            shipping_address: address(),
            total: dec!(53.20),
        }
    }

    #[test]
    fn test_metadata_round_trip() {
        let snapshot = snapshot();
        let metadata = snapshot.to_metadata().unwrap();
        let back = CheckoutSnapshot::from_metadata(&metadata).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_items_use_short_keys() {
        let metadata = snapshot().to_metadata().unwrap();
        let items = metadata.get(keys::ORDER_ITEMS).unwrap();
        assert!(items.contains("\"p\":"), "items json: {items}");
        assert!(items.contains("\"q\":"), "items json: {items}");
        assert!(!items.contains("product_id"), "items json: {items}");
    }

    #[test]
    fn test_oversized_cart_rejected() {
        let mut snapshot = snapshot();
        snapshot.items = (0..40)
            .map(|i| SnapshotItem {
                product_id: ProductId::new(i),
                name: format!("Product with a fairly long name {i}"),
                unit_price: dec!(9.99),
                quantity: 1,
            })
            .collect();

        let err = snapshot.to_metadata().unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::FieldTooLarge {
                field: keys::ORDER_ITEMS,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_key_reported() {
        let mut metadata = snapshot().to_metadata().unwrap();
        metadata.remove(keys::ORDER_ITEMS);

        let err = CheckoutSnapshot::from_metadata(&metadata).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::MissingField(keys::ORDER_ITEMS)
        ));
    }

    #[test]
    fn test_nonpositive_quantity_rejected() {
        for quantity in [0, -2] {
            let mut tampered = snapshot();
            tampered.items[0].quantity = quantity;
            let metadata = tampered.to_metadata().unwrap();

            let err = CheckoutSnapshot::from_metadata(&metadata).unwrap_err();
            assert!(
                matches!(
                    err,
                    SnapshotError::InvalidField {
                        field: keys::ORDER_ITEMS,
                        ..
                    }
                ),
                "quantity {quantity} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_garbage_items_reported() {
        let mut metadata = snapshot().to_metadata().unwrap();
        metadata.insert(keys::ORDER_ITEMS.to_owned(), "not json".to_owned());

        let err = CheckoutSnapshot::from_metadata(&metadata).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidField {
                field: keys::ORDER_ITEMS,
                ..
            }
        ));
    }
}
