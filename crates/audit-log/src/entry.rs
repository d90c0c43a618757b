use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{GroupId, OrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(Uuid);

impl AuditEntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entry ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed vocabulary of audit entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLogType {
    OrderCreated,
    OrderUpdated,
    OrderCancelled,
    GroupCreated,
    GroupStatusChanged,
    GroupUpdated,
    GroupDeleted,
}

impl AuditLogType {
    /// Returns the stored name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLogType::OrderCreated => "order_created",
            AuditLogType::OrderUpdated => "order_updated",
            AuditLogType::OrderCancelled => "order_cancelled",
            AuditLogType::GroupCreated => "group_created",
            AuditLogType::GroupStatusChanged => "group_status_changed",
            AuditLogType::GroupUpdated => "group_updated",
            AuditLogType::GroupDeleted => "group_deleted",
        }
    }

    /// Parses a stored type name.
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "order_created" => AuditLogType::OrderCreated,
            "order_updated" => AuditLogType::OrderUpdated,
            "order_cancelled" => AuditLogType::OrderCancelled,
            "group_created" => AuditLogType::GroupCreated,
            "group_status_changed" => AuditLogType::GroupStatusChanged,
            "group_updated" => AuditLogType::GroupUpdated,
            "group_deleted" => AuditLogType::GroupDeleted,
            _ => return None,
        })
    }

    /// Returns the kind of target entries of this type refer to.
    pub fn target_type(&self) -> TargetType {
        match self {
            AuditLogType::OrderCreated
            | AuditLogType::OrderUpdated
            | AuditLogType::OrderCancelled => TargetType::Order,
            _ => TargetType::Group,
        }
    }
}

impl std::fmt::Display for AuditLogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Order,
    Group,
}

impl TargetType {
    /// Returns the stored name of this target type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Order => "order",
            TargetType::Group => "group",
        }
    }

    /// Parses a stored target type name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "order" => Some(TargetType::Order),
            "group" => Some(TargetType::Group),
            _ => None,
        }
    }
}

/// One immutable record in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub log_type: AuditLogType,
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub target_type: TargetType,
    pub target_id: String,
    pub target_name: Option<String>,
    /// State of the target before the change, when meaningful.
    pub before: Option<serde_json::Value>,
    /// State of the target after the change, when meaningful.
    pub after: Option<serde_json::Value>,
    pub changed_fields: Option<Vec<String>>,
    /// Free-form context such as the group an order belongs to.
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates a new entry builder for the given log type.
    pub fn builder(log_type: AuditLogType) -> AuditEntryBuilder {
        AuditEntryBuilder::new(log_type)
    }
}

/// Builder for constructing audit entries.
#[derive(Debug)]
pub struct AuditEntryBuilder {
    log_type: AuditLogType,
    actor_id: Option<String>,
    actor_name: Option<String>,
    target_id: Option<String>,
    target_name: Option<String>,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    changed_fields: Option<Vec<String>>,
    metadata: HashMap<String, serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
}

impl AuditEntryBuilder {
    fn new(log_type: AuditLogType) -> Self {
        Self {
            log_type,
            actor_id: None,
            actor_name: None,
            target_id: None,
            target_name: None,
            before: None,
            after: None,
            changed_fields: None,
            metadata: HashMap::new(),
            created_at: None,
        }
    }

    /// Sets the acting user.
    pub fn actor(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.actor_id = Some(id.into());
        self.actor_name = name;
        self
    }

    /// Targets a group.
    pub fn group(mut self, id: GroupId, title: impl Into<String>) -> Self {
        self.target_id = Some(id.to_string());
        self.target_name = Some(title.into());
        self
    }

    /// Targets an order line item.
    pub fn order(mut self, id: OrderId, product_name: impl Into<String>) -> Self {
        self.target_id = Some(id.to_string());
        self.target_name = Some(product_name.into());
        self
    }

    /// Sets the before snapshot.
    pub fn before(mut self, value: serde_json::Value) -> Self {
        self.before = Some(value);
        self
    }

    /// Sets the after snapshot.
    pub fn after(mut self, value: serde_json::Value) -> Self {
        self.after = Some(value);
        self
    }

    /// Sets the list of fields that changed.
    pub fn changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the creation timestamp. If not set, the current time is used.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Builds the entry, returning None if the actor or target is missing.
    pub fn try_build(self) -> Option<AuditEntry> {
        Some(AuditEntry {
            id: AuditEntryId::new(),
            log_type: self.log_type,
            actor_id: self.actor_id?,
            actor_name: self.actor_name,
            target_type: self.log_type.target_type(),
            target_id: self.target_id?,
            target_name: self.target_name,
            before: self.before,
            after: self.after,
            changed_fields: self.changed_fields,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}
