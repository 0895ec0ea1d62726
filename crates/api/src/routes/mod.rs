//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Liveness check
//! GET  /health/ready               - Readiness check (database)
//!
//! # Products
//! GET  /products                   - Product listing
//! GET  /products/{id}              - Product detail
//! POST /products                   - Create product (admin token)
//! PATCH /products/{id}/stock       - Set absolute stock level (admin token)
//!
//! # Cart (requires customer identity)
//! GET    /cart                     - Current cart (lazily created)
//! POST   /cart/items               - Add item (increments when present)
//! PUT    /cart/items/{product_id}  - Set item quantity
//! DELETE /cart/items/{product_id}  - Remove item
//! DELETE /cart                     - Clear cart
//!
//! # Checkout
//! POST /payment/create-intent      - Validate cart, create payment intent
//! POST /payment/webhook            - Signed payment processor notifications
//!
//! # Orders
//! GET   /orders                    - Customer's orders, newest first
//! GET   /orders/{id}               - Order detail (owner only)
//! PATCH /orders/{id}/status        - Advance lifecycle status (admin token)
//!
//! # Identity
//! POST /identity/webhook           - Signed identity-provider lifecycle events
//! ```

pub mod cart;
pub mod identity;
pub mod orders;
pub mod payment;
pub mod products;

use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/{id}", get(products::show))
        .route("/{id}/stock", patch(products::restock))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{product_id}",
            put(cart::set_quantity).delete(cart::remove_item),
        )
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-intent", post(payment::create_intent))
        .route("/webhook", post(payment::webhook))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", patch(orders::update_status))
}

/// Create all routes for the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/payment", payment_routes())
        .nest("/orders", order_routes())
        .route("/identity/webhook", post(identity::webhook))
}
