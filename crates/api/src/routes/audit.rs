//! Audit trail reads.

use std::sync::Arc;

use audit_log::{AuditEntry, AuditLogStore, AuditLogType, AuditQuery, TargetType};
use axum::Json;
use axum::extract::{Query, State};
use domain::{Action, Resource, authorize};
use serde::Deserialize;

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;

#[derive(Deserialize, Default)]
pub struct AuditParams {
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub log_type: Option<String>,
    pub actor_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditParams {
    fn into_query(self) -> Result<AuditQuery, ApiError> {
        let limit = page_bound(self.limit.unwrap_or(DEFAULT_LIMIT), "limit")?;
        let mut query = AuditQuery::new().limit(limit);

        if let Some(raw) = self.target_type {
            query.target_type = Some(
                TargetType::parse(&raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown target type: {raw}")))?,
            );
        }
        if let Some(raw) = self.log_type {
            let log_type = AuditLogType::parse(&raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown log type: {raw}")))?;
            query = query.log_type(log_type);
        }
        if let Some(target_id) = self.target_id {
            query = query.target_id(target_id);
        }
        if let Some(actor_id) = self.actor_id {
            query = query.actor_id(actor_id);
        }
        if let Some(offset) = self.offset {
            query = query.offset(page_bound(offset, "offset")?);
        }
        Ok(query)
    }
}

/// Paging values must fit the signed 64-bit columns the stores bind them to.
fn page_bound(value: usize, name: &str) -> Result<usize, ApiError> {
    i64::try_from(value)
        .map(|_| value)
        .map_err(|_| ApiError::BadRequest(format!("{name} is out of range: {value}")))
}

/// GET /audit-logs
#[tracing::instrument(skip(state, actor, params), fields(actor_id = %actor.id))]
pub async fn list<A: AuditLogStore + 'static>(
    State(state): State<Arc<AppState<A>>>,
    CurrentActor(actor): CurrentActor,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    authorize(&actor, Action::ViewAuditLog, Resource::none())?;
    let entries = state.audit_log.query(params.into_query()?).await?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_build_a_filtered_query() {
        let params = AuditParams {
            target_type: Some("group".into()),
            target_id: Some("g-1".into()),
            limit: Some(5),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.target_type, Some(TargetType::Group));
        assert_eq!(query.target_id.as_deref(), Some("g-1"));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn limit_defaults_when_absent() {
        let query = AuditParams::default().into_query().unwrap();
        assert_eq!(query.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn oversized_paging_is_rejected() {
        let huge = usize::MAX;
        let params = AuditParams {
            limit: Some(huge),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));

        let params = AuditParams {
            offset: Some(huge),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));

        let params = AuditParams {
            offset: Some(40),
            ..Default::default()
        };
        assert_eq!(params.into_query().unwrap().offset, Some(40));
    }

    #[test]
    fn unknown_target_type_is_rejected() {
        let params = AuditParams {
            target_type: Some("invoice".into()),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(ApiError::BadRequest(_))));
    }
}
