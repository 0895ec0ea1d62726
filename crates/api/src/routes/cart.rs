//! Cart route handlers.
//!
//! JSON API over the customer's single cart. The cart holds product
//! references and quantities only; prices shown here are the live catalog
//! prices and carry no authority at checkout time.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use orchard_core::ProductId;

use crate::db::{CartRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireCustomer;
use crate::models::Cart;
use crate::state::AppState;

/// Cart payload returned by every cart endpoint.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub subtotal: rust_decimal::Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub product_id: ProductId,
    pub name: String,
    pub price: rust_decimal::Decimal,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub stock: i32,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        let subtotal = cart.subtotal();
        Self {
            items: cart
                .items
                .into_iter()
                .map(|item| CartItemResponse {
                    product_id: item.product_id,
                    name: item.name,
                    price: item.price,
                    image_url: item.image_url,
                    quantity: item.quantity,
                    stock: item.stock,
                })
                .collect(),
            subtotal,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

/// `GET /cart` - the customer's cart, created empty if absent.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<CartResponse>> {
    let cart = CartRepository::new(state.pool())
        .get_or_create(customer.id)
        .await?;

    Ok(Json(cart.into()))
}

/// `POST /cart/items` - add a product, bumping quantity if already present.
///
/// The stock check is advisory only; checkout re-validates every line.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn add_item(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    if request.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }

    let product = ProductRepository::new(state.pool())
        .get_by_id(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", request.product_id)))?;

    if !product.has_stock_for(request.quantity) {
        return Err(AppError::BadRequest(format!(
            "insufficient stock for {}",
            product.name
        )));
    }

    let cart = CartRepository::new(state.pool())
        .add_item(customer.id, request.product_id, request.quantity)
        .await?;

    Ok(Json(cart.into()))
}

/// `PUT /cart/items/{product_id}` - set a line's quantity.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn set_quantity(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(product_id): Path<ProductId>,
    Json(request): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>> {
    if request.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }

    let cart = CartRepository::new(state.pool())
        .set_quantity(customer.id, product_id, request.quantity)
        .await
        .map_err(|e| match e {
            crate::db::RepositoryError::NotFound => {
                AppError::NotFound(format!("product {product_id} not in cart"))
            }
            other => other.into(),
        })?;

    Ok(Json(cart.into()))
}

/// `DELETE /cart/items/{product_id}` - remove a line. Idempotent.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn remove_item(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartResponse>> {
    let cart = CartRepository::new(state.pool())
        .remove_item(customer.id, product_id)
        .await?;

    Ok(Json(cart.into()))
}

/// `DELETE /cart` - clear every line. Idempotent.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<StatusCode> {
    CartRepository::new(state.pool()).clear(customer.id).await?;

    Ok(StatusCode::NO_CONTENT)
}
