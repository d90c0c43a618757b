//! Per-(user, group) visit telemetry.

use chrono::{DateTime, Utc};
use common::{GroupId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::store::VisitStore;

/// How often and when a user looked at a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroupVisit {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub first_visited_at: DateTime<Utc>,
    pub last_visited_at: DateTime<Utc>,
    pub visit_count: u64,
}

impl UserGroupVisit {
    /// Record for a first visit.
    pub fn first(user_id: UserId, group_id: GroupId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            group_id,
            first_visited_at: at,
            last_visited_at: at,
            visit_count: 1,
        }
    }

    /// Counts another visit.
    pub fn revisit(&mut self, at: DateTime<Utc>) {
        self.visit_count += 1;
        self.last_visited_at = at;
    }
}

/// Records visits without ever failing the caller.
pub struct VisitTracker<V> {
    store: V,
}

impl<V: VisitStore> VisitTracker<V> {
    pub fn new(store: V) -> Self {
        Self { store }
    }

    /// Upserts the visit record. Store failures are logged and swallowed.
    #[tracing::instrument(skip(self))]
    pub async fn record_visit(&self, user_id: &UserId, group_id: GroupId) {
        match self.store.upsert_visit(user_id, group_id, Utc::now()).await {
            Ok(visit) => {
                tracing::debug!(visit_count = visit.visit_count, "visit recorded");
            }
            Err(error) => {
                metrics::counter!("visit_record_failures_total").increment(1);
                tracing::warn!(%error, "failed to record visit");
            }
        }
    }

    pub async fn get_visit(
        &self,
        user_id: &UserId,
        group_id: GroupId,
    ) -> Result<Option<UserGroupVisit>, DomainError> {
        Ok(self.store.get_visit(user_id, group_id).await?)
    }
}
