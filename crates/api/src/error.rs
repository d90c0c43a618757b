//! API error types with HTTP response mapping.

use audit_log::AuditLogError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No actor identity on the request.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Audit trail read failure.
    AuditLog(AuditLogError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Domain(err) => {
                let status = domain_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "domain operation failed");
                }
                (status, err.kind(), err.to_string())
            }
            ApiError::AuditLog(err) => {
                tracing::error!(error = %err, "audit log query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "audit_log", err.to_string())
            }
        };

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Forbidden { .. } => StatusCode::FORBIDDEN,
        DomainError::InvalidState { .. } | DomainError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::ThresholdViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<AuditLogError> for ApiError {
    fn from(err: AuditLogError) -> Self {
        ApiError::AuditLog(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                DomainError::ThresholdViolation("too small".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DomainError::Forbidden {
                    actor: "u1".into(),
                    action: "confirm this group",
                },
                StatusCode::FORBIDDEN,
            ),
            (
                DomainError::NotFound {
                    entity: "Group",
                    id: "g1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(domain_status(&err), expected, "{err}");
        }
    }

    #[test]
    fn unauthorized_renders_json_body() {
        let response = ApiError::Unauthorized("missing x-actor-id header".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
