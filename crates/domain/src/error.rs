//! Domain error types.

use common::Version;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A group, order, or setting does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The actor lacks the role or ownership the action requires.
    #[error("Forbidden: {actor} may not {action}")]
    Forbidden { actor: String, action: &'static str },

    /// The operation is not valid for the current status.
    #[error("Invalid state: cannot {action} while {current}")]
    InvalidState { current: String, action: &'static str },

    /// A per-user or per-group minimum would be breached.
    #[error("Threshold violation: {0}")]
    ThresholdViolation(String),

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another writer committed to the same group first.
    #[error("Concurrency conflict on group {group_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        group_id: String,
        expected: Version,
        actual: Version,
    },

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::Forbidden { .. } => "forbidden",
            DomainError::InvalidState { .. } => "invalid_state",
            DomainError::ThresholdViolation(_) => "threshold_violation",
            DomainError::Validation(_) => "validation",
            DomainError::ConcurrencyConflict { .. } => "concurrency_conflict",
            DomainError::Store(_) => "store",
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_state(current: impl ToString, action: &'static str) -> Self {
        DomainError::InvalidState {
            current: current.to_string(),
            action,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict {
                group_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                group_id: group_id.to_string(),
                expected,
                actual,
            },
            StoreError::GroupNotFound(id) => DomainError::not_found("Group", id),
            StoreError::OrderNotFound(id) => DomainError::not_found("Order", id),
            other => DomainError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::GroupId;

    #[test]
    fn store_conflict_maps_to_domain_conflict() {
        let err: DomainError = StoreError::ConcurrencyConflict {
            group_id: GroupId::new(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert_eq!(err.kind(), "concurrency_conflict");
    }

    #[test]
    fn missing_group_maps_to_not_found() {
        let err: DomainError = StoreError::GroupNotFound(GroupId::new()).into();
        assert!(matches!(err, DomainError::NotFound { entity: "Group", .. }));
    }

    #[test]
    fn unavailable_stays_a_store_error() {
        let err: DomainError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, DomainError::Store(StoreError::Unavailable(_))));
    }
}
