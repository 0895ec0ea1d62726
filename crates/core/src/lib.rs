//! Orchard Core - Shared domain types.
//!
//! This crate provides common types used across all Orchard components:
//! - `api` - Backend API serving the admin dashboard and mobile app
//! - `integration-tests` - End-to-end test harness
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money/minor-unit conversion, lifecycle statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
