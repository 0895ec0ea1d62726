//! Domain types for the Orchard API.
//!
//! These are validated domain objects, separate from database row types;
//! the repositories in [`crate::db`] map rows into them.

pub mod cart;
pub mod customer;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem};
pub use customer::Customer;
pub use order::{Order, OrderItem, PaymentResult, ShippingAddress};
pub use product::Product;
