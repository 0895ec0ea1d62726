//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::instrument;

use orchard_core::{OrderId, OrderStatus};

use crate::db::{OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireCustomer};
use crate::models::Order;
use crate::state::AppState;

/// Body of `PATCH /orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// `GET /orders` - the customer's orders, newest first.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<Vec<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_customer(customer.id)
        .await?;

    Ok(Json(orders))
}

/// `GET /orders/{id}` - order detail, owner only.
///
/// A foreign order id answers 404, not 403, so ids don't leak existence.
#[instrument(skip(state, customer), fields(customer_id = %customer.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .filter(|order| order.customer_id == customer.id)
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

    Ok(Json(order))
}

/// `PATCH /orders/{id}/status` - advance the lifecycle status
/// (admin token required).
///
/// Only forward steps are legal: `pending -> shipped -> delivered`.
#[instrument(skip(state, _admin))]
pub async fn update_status(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<OrderId>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    let order = OrderRepository::new(state.pool())
        .update_status(id, request.status)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound(format!("order {id}")),
            RepositoryError::Conflict(message) => AppError::Conflict(message),
            other => other.into(),
        })?;

    tracing::info!(order_id = %id, status = %order.status, "order status updated");

    Ok(Json(order))
}
