//! Group endpoints: creation, reads, lifecycle transitions, edits and visits.

use std::sync::Arc;

use audit_log::AuditLogStore;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{GroupId, UserId};
use domain::{
    DeliveryInfo, DeliveryStage, Group, GroupDetailsUpdate, GroupStatus, MenuItem, Money, NewGroup,
    OrderLine, OrderStatus, OrderTransaction, RateSource, Settlement,
};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct MenuItemRequest {
    pub product_id: String,
    pub name: String,
    pub sale_price: i64,
    /// Defaults to the sale price.
    pub list_price: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub title: String,
    /// Admins may create on behalf of another organizer.
    pub organizer_id: Option<String>,
    pub organizer_name: Option<String>,
    pub menu_items: Vec<MenuItemRequest>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery: DeliveryInfo,
}

#[derive(Deserialize)]
pub struct UpdateDatesRequest {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct DeliveryStageRequest {
    pub stage: DeliveryStage,
}

// -- Response types --

#[derive(Serialize)]
pub struct GroupResponse {
    pub id: String,
    pub title: String,
    pub organizer_id: String,
    pub organizer_name: String,
    pub status: GroupStatus,
    pub delivery_stage: Option<DeliveryStage>,
    pub order_status: OrderStatus,
    pub minimum_total: Money,
    pub current_total: Money,
    pub menu_items: Vec<MenuItem>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub delivery: DeliveryInfo,
    pub shipping_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<&Group> for GroupResponse {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id().to_string(),
            title: group.title().to_string(),
            organizer_id: group.organizer_id().to_string(),
            organizer_name: group.organizer_name().to_string(),
            status: group.status(),
            delivery_stage: group.delivery_stage(),
            order_status: group.order_status(),
            minimum_total: group.minimum_total(),
            current_total: group.current_total(),
            menu_items: group.menu_items().to_vec(),
            start_date: group.start_date(),
            end_date: group.end_date(),
            delivery: group.delivery().clone(),
            shipping_started_at: group.shipping_started_at(),
            created_at: group.created_at(),
            updated_at: group.updated_at(),
            version: group.version().as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct SettlementResponse {
    pub group_id: String,
    pub organizer_id: String,
    pub order_total: Money,
    pub rate_percent: f64,
    pub rate_source: RateSource,
    pub commission: Money,
}

impl From<Settlement> for SettlementResponse {
    fn from(s: Settlement) -> Self {
        Self {
            group_id: s.group_id.to_string(),
            organizer_id: s.organizer_id.to_string(),
            order_total: s.order_total,
            rate_percent: s.rate.as_percent(),
            rate_source: s.rate_source,
            commission: s.commission,
        }
    }
}

type GroupResult = Result<Json<GroupResponse>, ApiError>;

fn group_id(raw: &str) -> Result<GroupId, ApiError> {
    parse_id(raw, "group")
}

// -- Handlers --

/// POST /groups
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn create<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    let (organizer_id, organizer_name) = match req.organizer_id {
        Some(id) => {
            let name = req.organizer_name.unwrap_or_else(|| id.clone());
            (UserId::new(id), name)
        }
        None => (actor.id.clone(), actor.name.clone()),
    };
    let menu_items = req
        .menu_items
        .into_iter()
        .map(|item| {
            let sale = Money::won(item.sale_price);
            let list = item.list_price.map(Money::won).unwrap_or(sale);
            MenuItem::snapshot(item.product_id, item.name, sale, list)
        })
        .collect();

    let group = state
        .market
        .create_group(
            &actor,
            NewGroup {
                title: req.title,
                organizer_id,
                organizer_name,
                menu_items,
                start_date: req.start_date,
                end_date: req.end_date,
                delivery: req.delivery,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from(&group))))
}

/// GET /groups
pub async fn list<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let groups = state.market.list_groups().await?;
    Ok(Json(groups.iter().map(GroupResponse::from).collect()))
}

/// GET /groups/{id}
#[tracing::instrument(skip(state))]
pub async fn get<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
) -> GroupResult {
    let group = state.market.get_group(group_id(&id)?).await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// PATCH /groups/{id}/dates
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn update_dates<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<UpdateDatesRequest>,
) -> GroupResult {
    let group = state
        .market
        .update_group_dates(&actor, group_id(&id)?, req.start_date, req.end_date)
        .await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// PATCH /groups/{id}
#[tracing::instrument(skip(state, actor, update), fields(actor_id = %actor.id))]
pub async fn update_details<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(update): Json<GroupDetailsUpdate>,
) -> GroupResult {
    let group = state
        .market
        .update_group_details(&actor, group_id(&id)?, update)
        .await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// DELETE /groups/{id}
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn delete<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.market.delete_group(&actor, group_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /groups/{id}/confirm
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn confirm<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> GroupResult {
    let group = state.market.confirm_group(&actor, group_id(&id)?).await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// POST /groups/{id}/cancel-confirm
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn cancel_confirm<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> GroupResult {
    let group = state
        .market
        .cancel_confirm_group(&actor, group_id(&id)?)
        .await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// POST /groups/{id}/shipping
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn shipping<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> GroupResult {
    let group = state.market.mark_shipping(&actor, group_id(&id)?).await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// POST /groups/{id}/complete
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn complete<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> GroupResult {
    let group = state.market.mark_complete(&actor, group_id(&id)?).await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// PUT /groups/{id}/delivery-stage
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn delivery_stage<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<DeliveryStageRequest>,
) -> GroupResult {
    let group = state
        .market
        .update_delivery_stage(&actor, group_id(&id)?, req.stage)
        .await?;
    Ok(Json(GroupResponse::from(&group)))
}

/// GET /groups/{id}/orders
#[tracing::instrument(skip(state))]
pub async fn orders<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderLine>>, ApiError> {
    Ok(Json(state.market.orders_for_group(group_id(&id)?).await?))
}

/// GET /groups/{id}/my-orders
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn my_orders<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderTransaction>>, ApiError> {
    let transactions = state
        .market
        .user_order_transactions(group_id(&id)?, &actor.id)
        .await?;
    Ok(Json(transactions))
}

/// GET /groups/{id}/settlement
#[tracing::instrument(skip(state))]
pub async fn settlement<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<String>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let settlement = state
        .commissions
        .compute_settlement(group_id(&id)?)
        .await?;
    Ok(Json(settlement.into()))
}

/// POST /groups/{id}/visits
///
/// Telemetry only: bad ids and storage failures are swallowed and the response
/// is always 204.
pub async fn record_visit<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> StatusCode {
    match group_id(&id) {
        Ok(group_id) => state.visits.record_visit(&actor.id, group_id).await,
        Err(error) => {
            tracing::debug!(%id, ?error, "visit for unparseable group id ignored");
            metrics::counter!("visits_ignored_total").increment(1);
        }
    }
    StatusCode::NO_CONTENT
}
