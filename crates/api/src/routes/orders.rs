//! Order line endpoints.

use std::sync::Arc;

use audit_log::AuditLogStore;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{GroupId, OrderId, TransactionId, UserId};
use domain::{CancelScope, Money, NewOrderLine, OrderLine, ProductId};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub group_id: GroupId,
    /// Defaults to the caller. Only admins may order for someone else.
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: i64,
}

#[derive(Deserialize)]
pub struct CreateOrdersRequest {
    pub lines: Vec<OrderLineRequest>,
    /// Appends the lines to an existing transaction.
    pub shared_creation_key: Option<TransactionId>,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub quantity: u32,
    pub unit_price: i64,
}

#[derive(Deserialize, Default)]
pub struct CancelParams {
    /// Organizer/admin cancellation without the per-user minimum check.
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Deserialize)]
pub struct CancelTransactionRequest {
    pub order_ids: Vec<OrderId>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CreateOrdersResponse {
    pub order_ids: Vec<OrderId>,
}

fn order_id(raw: &str) -> Result<OrderId, ApiError> {
    parse_id(raw, "order")
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(
    skip(state, actor, req),
    fields(actor_id = %actor.id, lines = req.lines.len())
)]
pub async fn create<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateOrdersRequest>,
) -> Result<(StatusCode, Json<CreateOrdersResponse>), ApiError> {
    let lines = req
        .lines
        .into_iter()
        .map(|line| {
            let (user_id, user_name) = match line.user_id {
                Some(id) => {
                    let name = line.user_name.unwrap_or_else(|| id.clone());
                    (UserId::new(id), name)
                }
                None => (actor.id.clone(), actor.name.clone()),
            };
            NewOrderLine {
                group_id: line.group_id,
                user_id,
                user_name,
                product_id: ProductId::new(line.product_id),
                quantity: line.quantity,
                unit_price: Money::won(line.unit_price),
            }
        })
        .collect();

    let order_ids = state
        .market
        .create_orders(&actor, lines, req.shared_creation_key)
        .await?;

    Ok((StatusCode::CREATED, Json(CreateOrdersResponse { order_ids })))
}

/// PATCH /orders/{id}
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn update<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderLine>, ApiError> {
    let line = state
        .market
        .update_user_order(
            &actor,
            order_id(&id)?,
            req.quantity,
            Money::won(req.unit_price),
        )
        .await?;
    Ok(Json(line))
}

/// DELETE /orders/{id}?privileged=true
#[tracing::instrument(skip(state, actor, params), fields(actor_id = %actor.id))]
pub async fn cancel<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> Result<StatusCode, ApiError> {
    let scope = if params.privileged {
        CancelScope::Privileged
    } else {
        CancelScope::Own
    };
    state
        .market
        .cancel_order(&actor, order_id(&id)?, scope)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /orders/cancel-transaction
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn cancel_transaction<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CancelTransactionRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .market
        .cancel_order_group(&actor, req.order_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
