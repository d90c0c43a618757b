use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AuditEntry, AuditLogError, AuditQuery, Result,
    store::{AuditLogStore, EntryStream},
};

/// In-memory audit trail for tests and single-node deployments.
#[derive(Clone, Default)]
pub struct InMemoryAuditLogStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    deny_writes: Arc<AtomicBool>,
}

impl InMemoryAuditLogStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail with `PermissionDenied`.
    pub fn set_deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Returns a copy of every stored entry in insertion order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        if self.deny_writes.load(Ordering::SeqCst) {
            return Err(AuditLogError::PermissionDenied(
                "audit log writes are not permitted".to_string(),
            ));
        }
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store.iter().filter(|e| query.matches(e)).cloned().collect();

        // Stable sort keeps insertion order among equal timestamps
        entries.sort_by_key(|e| e.created_at);

        let offset = query.offset.unwrap_or(0);
        let entries = entries.into_iter().skip(offset);
        let entries = match query.limit {
            Some(limit) => entries.take(limit).collect(),
            None => entries.collect(),
        };

        Ok(entries)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn stream_all(&self) -> Result<EntryStream> {
        use futures_util::stream;

        let mut entries = self.entries.read().await.clone();
        entries.sort_by_key(|e| e.created_at);

        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }
}
