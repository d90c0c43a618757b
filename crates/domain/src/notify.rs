//! Status-change notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::GroupId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::group::GroupStatus;

/// Sent to the notification dispatcher whenever a group's status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub group_id: GroupId,
    pub title: String,
    pub old_status: GroupStatus,
    pub new_status: GroupStatus,
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Receives status changes. Failures are logged by the caller and never
/// affect the operation that caused the change.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, notification: StatusNotification) -> Result<(), NotifyError>;
}

/// Collects notifications in memory.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<StatusNotification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far, oldest first.
    pub async fn notifications(&self) -> Vec<StatusNotification> {
        self.sent.read().await.clone()
    }

    pub async fn clear(&self) {
        self.sent.write().await.clear();
    }
}

#[async_trait]
impl StatusNotifier for InMemoryNotifier {
    async fn notify(&self, notification: StatusNotification) -> Result<(), NotifyError> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}

/// Emits each notification as a tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl StatusNotifier for TracingNotifier {
    async fn notify(&self, n: StatusNotification) -> Result<(), NotifyError> {
        tracing::info!(
            group_id = %n.group_id,
            title = %n.title,
            old_status = %n.old_status,
            new_status = %n.new_status,
            "group status changed"
        );
        Ok(())
    }
}
