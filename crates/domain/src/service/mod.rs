//! The group-buying engine.
//!
//! [`GroupBuyService`] runs every group and order mutation. Each one takes the
//! group's lock, re-reads current state, checks authorization and
//! preconditions, and commits the group together with its line-item changes
//! in a single versioned [`GroupCommit`]. Audit entries and status
//! notifications go out only after the commit succeeded.

mod groups;
mod locks;
mod orders;

use audit_log::{AuditEntry, AuditEntryBuilder, AuditLogType, AuditOutbox};
use chrono::{DateTime, Utc};

use crate::auth::Actor;
use crate::error::DomainError;
use crate::group::{Group, OrderStatus, StageChange};
use crate::notify::{StatusNotification, StatusNotifier};
use crate::order::OrderLine;
use crate::store::{GroupCommit, MarketStore};

pub use locks::GroupLocks;
pub use orders::CancelScope;

/// Runs group and order operations.
pub struct GroupBuyService<S, N> {
    store: S,
    notifier: N,
    audit: AuditOutbox,
    locks: GroupLocks,
}

impl<S, N> GroupBuyService<S, N>
where
    S: MarketStore,
    N: StatusNotifier,
{
    /// Creates a service over `store`, publishing to `notifier` and `audit`.
    pub fn new(store: S, notifier: N, audit: AuditOutbox) -> Self {
        Self {
            store,
            notifier,
            audit,
            locks: GroupLocks::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Commits and returns the group at its new version.
    async fn commit(&self, commit: GroupCommit) -> Result<Group, DomainError> {
        let mut group = commit.group.clone();
        let version = self.store.commit_group(commit).await?;
        group.set_version(version);
        Ok(group)
    }

    /// Rewrites the status of every line of `group` after an explicit transition.
    async fn restamp_orders(
        &self,
        group: &Group,
        change: &StageChange,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderLine>, DomainError> {
        let status = OrderStatus::for_group(change.new_status());
        if status == OrderStatus::for_group(change.old_status()) {
            return Ok(Vec::new());
        }

        let mut lines = self.store.orders_for_group(group.id()).await?;
        lines.retain(|l| l.status != status);
        for line in &mut lines {
            line.status = status;
            line.updated_at = now;
        }
        Ok(lines)
    }

    /// Records a committed stage change and notifies on status changes.
    async fn announce(
        &self,
        actor: &Actor,
        group: &Group,
        change: StageChange,
        trigger: &'static str,
    ) {
        let log_type = if change.status_changed() {
            AuditLogType::GroupStatusChanged
        } else {
            AuditLogType::GroupUpdated
        };
        let mut entry = group_entry(log_type, actor, group)
            .before(StageChange::state_json(change.from))
            .after(StageChange::state_json(change.to))
            .metadata("trigger", serde_json::json!(trigger));
        if !change.status_changed() {
            entry = entry.changed_fields(["delivery_stage"]);
        }
        self.emit(entry);

        if !change.status_changed() {
            return;
        }

        metrics::counter!(
            "group_status_transitions_total",
            "from" => change.old_status().label(),
            "to" => change.new_status().label()
        )
        .increment(1);
        tracing::info!(
            group_id = %group.id(),
            from = %change.old_status(),
            to = %change.new_status(),
            trigger,
            "group status changed"
        );

        let notification = StatusNotification {
            group_id: group.id(),
            title: group.title().to_string(),
            old_status: change.old_status(),
            new_status: change.new_status(),
        };
        if let Err(error) = self.notifier.notify(notification).await {
            tracing::warn!(%error, group_id = %group.id(), "status notification failed");
        }
    }

    fn emit(&self, builder: AuditEntryBuilder) {
        if let Some(entry) = builder.try_build() {
            self.audit.emit(entry);
        }
    }
}

fn group_entry(log_type: AuditLogType, actor: &Actor, group: &Group) -> AuditEntryBuilder {
    AuditEntry::builder(log_type)
        .actor(actor.id.as_str(), Some(actor.name.clone()))
        .group(group.id(), group.title())
}

fn order_entry(log_type: AuditLogType, actor: &Actor, line: &OrderLine) -> AuditEntryBuilder {
    AuditEntry::builder(log_type)
        .actor(actor.id.as_str(), Some(actor.name.clone()))
        .order(line.id, line.product_name.as_str())
        .metadata("group_id", serde_json::json!(line.group_id.to_string()))
        .metadata(
            "transaction_id",
            serde_json::json!(line.transaction_id.to_string()),
        )
        .metadata("user_id", serde_json::json!(line.user_id.as_str()))
}

fn record_rejection(operation: &'static str, error: &DomainError) {
    metrics::counter!(
        "order_mutation_rejections_total",
        "operation" => operation,
        "reason" => error.kind()
    )
    .increment(1);
    tracing::debug!(operation, %error, "order mutation rejected");
}
