use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AuditEntry, AuditQuery, Result, TargetType};

/// A stream of audit entries.
pub type EntryStream = Pin<Box<dyn Stream<Item = Result<AuditEntry>> + Send>>;

/// Core trait for audit trail storage.
///
/// The trail is append-only; there is no update or delete.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Appends one entry to the trail.
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Retrieves entries matching a query, oldest first.
    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>>;

    /// Returns the total number of stored entries.
    async fn count(&self) -> Result<u64>;

    /// Streams every entry in creation order.
    async fn stream_all(&self) -> Result<EntryStream>;
}

/// Extension trait providing convenience methods for audit stores.
#[async_trait]
pub trait AuditLogStoreExt: AuditLogStore {
    /// Retrieves every entry recorded for one target, oldest first.
    async fn entries_for_target(
        &self,
        target_type: TargetType,
        target_id: &str,
    ) -> Result<Vec<AuditEntry>> {
        self.query(AuditQuery::for_target(target_type, target_id))
            .await
    }
}

impl<T: AuditLogStore + ?Sized> AuditLogStoreExt for T {}
