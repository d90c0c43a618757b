use chrono::{DateTime, Utc};

use crate::{AuditEntry, AuditLogType, TargetType};

/// Builder for constructing audit trail queries.
///
/// Filters combine with AND; results are ordered by creation time.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Filter by target kind.
    pub target_type: Option<TargetType>,

    /// Filter by target ID.
    pub target_id: Option<String>,

    /// Filter by log types (any of these types).
    pub log_types: Option<Vec<AuditLogType>>,

    /// Filter by acting user.
    pub actor_id: Option<String>,

    /// Filter by entries created at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by entries created at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,

    /// Number of entries to skip.
    pub offset: Option<usize>,
}

impl AuditQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a specific target.
    pub fn for_target(target_type: TargetType, target_id: impl Into<String>) -> Self {
        Self {
            target_type: Some(target_type),
            target_id: Some(target_id.into()),
            ..Default::default()
        }
    }

    /// Filters by target ID regardless of target kind.
    pub fn target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Filters by a single log type.
    pub fn log_type(mut self, log_type: AuditLogType) -> Self {
        self.log_types = Some(vec![log_type]);
        self
    }

    /// Filters by multiple log types (any of these).
    pub fn log_types(mut self, log_types: Vec<AuditLogType>) -> Self {
        self.log_types = Some(log_types);
        self
    }

    /// Filters by acting user.
    pub fn actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Filters to entries created at or after this timestamp.
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters to entries created at or before this timestamp.
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    /// Limits the number of entries returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many entries before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the entry passes every filter (limit and offset excluded).
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(target_type) = self.target_type
            && entry.target_type != target_type
        {
            return false;
        }
        if let Some(ref target_id) = self.target_id
            && &entry.target_id != target_id
        {
            return false;
        }
        if let Some(ref types) = self.log_types
            && !types.contains(&entry.log_type)
        {
            return false;
        }
        if let Some(ref actor_id) = self.actor_id
            && &entry.actor_id != actor_id
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && entry.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && entry.created_at > to
        {
            return false;
        }
        true
    }
}
