//! The checkout pipeline.
//!
//! Three stages around one payment:
//!
//! 1. [`intent`] - validate the cart against live products, price it
//!    server-side, and create a payment intent carrying a snapshot of the
//!    validated lines.
//! 2. The processor collects payment (out of process) and notifies us;
//!    `payments::webhook` authenticates the notification.
//! 3. [`materialize`] - turn a verified "payment succeeded" notification
//!    into a durable order and stock decrements, exactly once.
//!
//! [`snapshot`] is the contract between stages 1 and 3: the line items the
//! intent builder validated are the ones the order records, regardless of
//! what the catalog looks like by the time the webhook lands.

pub mod intent;
pub mod materialize;
pub mod snapshot;

pub use intent::{CheckoutError, CreatedIntent, build_intent};
pub use materialize::{MaterializeError, MaterializedOrder, materialize_payment};
pub use snapshot::{CheckoutSnapshot, SnapshotError, SnapshotItem};
