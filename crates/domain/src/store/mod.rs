//! Persistence ports for groups, orders, settings and visits.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GroupId, OrderId, TransactionId, UserId, Version};
use thiserror::Error;

use crate::commission::{AdminSettings, CommissionRate};
use crate::group::Group;
use crate::order::OrderLine;
use crate::visit::UserGroupVisit;

pub use memory::InMemoryMarketStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The group was changed by another writer since it was read.
    #[error(
        "Concurrency conflict for group {group_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        group_id: GroupId,
        expected: Version,
        actual: Version,
    },

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One atomic write against a single group.
///
/// The group row and its line-item changes are applied together, and only if
/// the stored group is still at `expected_version`.
#[derive(Debug, Clone)]
pub struct GroupCommit {
    pub group: Group,
    pub expected_version: Version,
    /// Lines to insert or replace.
    pub upserts: Vec<OrderLine>,
    /// Lines to remove.
    pub deletes: Vec<OrderId>,
}

impl GroupCommit {
    /// A commit of the group row alone.
    pub fn group_only(group: Group) -> Self {
        let expected_version = group.version();
        Self {
            group,
            expected_version,
            upserts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn with_upserts(mut self, upserts: Vec<OrderLine>) -> Self {
        self.upserts = upserts;
        self
    }

    pub fn with_deletes(mut self, deletes: Vec<OrderId>) -> Self {
        self.deletes = deletes;
        self
    }
}

/// Storage for groups and their order lines.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Stores a newly created group.
    async fn insert_group(&self, group: Group) -> Result<()>;

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>>;

    /// All groups, oldest first.
    async fn list_groups(&self) -> Result<Vec<Group>>;

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderLine>>;

    /// All lines of a group, in creation order.
    async fn orders_for_group(&self, group_id: GroupId) -> Result<Vec<OrderLine>>;

    /// All lines carrying the given transaction id.
    async fn orders_in_transaction(&self, transaction_id: TransactionId) -> Result<Vec<OrderLine>>;

    /// Applies a [`GroupCommit`] atomically and returns the group's new version.
    async fn commit_group(&self, commit: GroupCommit) -> Result<Version>;

    /// Removes a group and all of its lines if it is still at `expected_version`.
    ///
    /// Returns the removed lines.
    async fn delete_group(&self, id: GroupId, expected_version: Version) -> Result<Vec<OrderLine>>;
}

/// Extension methods for market stores.
#[async_trait]
pub trait MarketStoreExt: MarketStore {
    /// Loads a group or fails with [`StoreError::GroupNotFound`].
    async fn require_group(&self, id: GroupId) -> Result<Group> {
        self.get_group(id).await?.ok_or(StoreError::GroupNotFound(id))
    }

    /// Loads an order or fails with [`StoreError::OrderNotFound`].
    async fn require_order(&self, id: OrderId) -> Result<OrderLine> {
        self.get_order(id).await?.ok_or(StoreError::OrderNotFound(id))
    }

    /// A user's lines in one group.
    async fn user_orders(&self, group_id: GroupId, user_id: &UserId) -> Result<Vec<OrderLine>> {
        let orders = self.orders_for_group(group_id).await?;
        Ok(orders.into_iter().filter(|o| &o.user_id == user_id).collect())
    }
}

impl<T: MarketStore + ?Sized> MarketStoreExt for T {}

/// Commission overrides and the admin settings singleton.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn organizer_rate(&self, organizer_id: &UserId) -> Result<Option<CommissionRate>>;

    async fn set_organizer_rate(&self, organizer_id: UserId, rate: CommissionRate) -> Result<()>;

    /// Removes an override. Returns false if none existed.
    async fn delete_organizer_rate(&self, organizer_id: &UserId) -> Result<bool>;

    /// Returns the stored settings, or the defaults if never written.
    async fn admin_settings(&self) -> Result<AdminSettings>;

    async fn save_admin_settings(&self, settings: AdminSettings) -> Result<()>;
}

/// Per-(user, group) visit records.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Creates or bumps the record for `(user_id, group_id)` in one step.
    async fn upsert_visit(
        &self,
        user_id: &UserId,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> Result<UserGroupVisit>;

    async fn get_visit(&self, user_id: &UserId, group_id: GroupId)
    -> Result<Option<UserGroupVisit>>;
}
