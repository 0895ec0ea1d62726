//! Product catalog route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use orchard_core::ProductId;

use crate::db::{ProductRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Product;
use crate::state::AppState;

/// Body of `POST /products`.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: String,
    /// Image URLs, already uploaded and resolved by the image host.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Body of `PATCH /products/{id}/stock`.
#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub stock: i32,
}

/// `GET /products` - catalog listing, newest first.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = ProductRepository::new(state.pool()).list().await?;
    Ok(Json(products))
}

/// `GET /products/{id}` - product detail.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = ProductRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    Ok(Json(product))
}

/// `POST /products` - create a product (admin token required).
#[instrument(skip(state, _admin, request), fields(name = %request.name))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    if request.price <= Decimal::ZERO {
        return Err(AppError::BadRequest("price must be positive".to_string()));
    }
    if request.stock < 0 {
        return Err(AppError::BadRequest(
            "stock must not be negative".to_string(),
        ));
    }

    let product = ProductRepository::new(state.pool())
        .create(
            &request.name,
            request.description.as_deref(),
            request.price,
            request.stock,
            &request.category,
            &request.image_urls,
        )
        .await?;

    tracing::info!(product_id = %product.id, "product created");

    Ok((StatusCode::CREATED, Json(product)))
}

/// `PATCH /products/{id}/stock` - set stock to an absolute value (admin
/// token required). Used for restocking and for reconciling oversold
/// orders.
#[instrument(skip(state, _admin, request))]
pub async fn restock(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<ProductId>,
    Json(request): Json<RestockRequest>,
) -> Result<StatusCode> {
    if request.stock < 0 {
        return Err(AppError::BadRequest(
            "stock must not be negative".to_string(),
        ));
    }

    ProductRepository::new(state.pool())
        .set_stock(id, request.stock)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound(format!("product {id}")),
            other => other.into(),
        })?;

    tracing::info!(product_id = %id, stock = request.stock, "product restocked");

    Ok(StatusCode::NO_CONTENT)
}
