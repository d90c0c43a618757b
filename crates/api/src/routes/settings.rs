//! Commission overrides and admin settings.

use std::sync::Arc;

use audit_log::AuditLogStore;
use axum::Json;
use axum::extract::{Path, State};
use common::UserId;
use domain::{CommissionRate, RateSource};
use serde::{Deserialize, Serialize};

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RateRequest {
    pub rate_percent: f64,
}

#[derive(Deserialize, Serialize)]
pub struct RecruitmentBody {
    pub open: bool,
}

#[derive(Serialize)]
pub struct OrganizerRateResponse {
    pub organizer_id: String,
    /// The explicit override, absent when the default applies.
    pub override_percent: Option<f64>,
    pub effective_percent: f64,
    pub source: RateSource,
}

#[derive(Serialize)]
pub struct DefaultRateResponse {
    pub rate_percent: f64,
}

#[derive(Serialize)]
pub struct DeleteRateResponse {
    pub deleted: bool,
}

async fn organizer_rate_response<A: AuditLogStore>(
    state: &AppState<A>,
    organizer_id: &UserId,
) -> Result<OrganizerRateResponse, ApiError> {
    let override_rate = state.commissions.organizer_rate(organizer_id).await?;
    let resolved = state.commissions.resolve_rate(organizer_id).await?;
    Ok(OrganizerRateResponse {
        organizer_id: organizer_id.to_string(),
        override_percent: override_rate.map(|r| r.as_percent()),
        effective_percent: resolved.rate.as_percent(),
        source: resolved.source,
    })
}

/// GET /commissions/{organizer_id}
pub async fn get_organizer_rate<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    Path(organizer_id): Path<String>,
) -> Result<Json<OrganizerRateResponse>, ApiError> {
    let response = organizer_rate_response(&state, &UserId::new(organizer_id)).await?;
    Ok(Json(response))
}

/// PUT /commissions/{organizer_id}
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn set_organizer_rate<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(organizer_id): Path<String>,
    Json(req): Json<RateRequest>,
) -> Result<Json<OrganizerRateResponse>, ApiError> {
    let organizer_id = UserId::new(organizer_id);
    let rate = CommissionRate::from_percent(req.rate_percent)?;
    state
        .commissions
        .set_organizer_rate(&actor, organizer_id.clone(), rate)
        .await?;
    let response = organizer_rate_response(&state, &organizer_id).await?;
    Ok(Json(response))
}

/// DELETE /commissions/{organizer_id}
#[tracing::instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn delete_organizer_rate<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Path(organizer_id): Path<String>,
) -> Result<Json<DeleteRateResponse>, ApiError> {
    let deleted = state
        .commissions
        .delete_organizer_rate(&actor, &UserId::new(organizer_id))
        .await?;
    Ok(Json(DeleteRateResponse { deleted }))
}

/// GET /settings/commission
pub async fn get_default_rate<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
) -> Result<Json<DefaultRateResponse>, ApiError> {
    let rate = state.commissions.default_rate().await?;
    Ok(Json(DefaultRateResponse {
        rate_percent: rate.as_percent(),
    }))
}

/// PUT /settings/commission
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn set_default_rate<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RateRequest>,
) -> Result<Json<DefaultRateResponse>, ApiError> {
    let rate = CommissionRate::from_percent(req.rate_percent)?;
    state.commissions.set_default_rate(&actor, rate).await?;
    Ok(Json(DefaultRateResponse {
        rate_percent: rate.as_percent(),
    }))
}

/// GET /settings/recruitment
pub async fn get_recruitment<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
) -> Result<Json<RecruitmentBody>, ApiError> {
    let open = state.commissions.recruitment_open().await?;
    Ok(Json(RecruitmentBody { open }))
}

/// PUT /settings/recruitment
#[tracing::instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn set_recruitment<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<RecruitmentBody>,
) -> Result<Json<RecruitmentBody>, ApiError> {
    state
        .commissions
        .set_recruitment_open(&actor, req.open)
        .await?;
    Ok(Json(req))
}
