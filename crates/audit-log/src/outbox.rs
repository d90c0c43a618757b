//! Outbox delivery of audit entries.
//!
//! Producers push entries into an [`AuditOutbox`] after their primary write has
//! committed. An [`AuditRecorder`] owns the receiving side and appends each
//! entry to an [`AuditLogStore`]. Store failures are classified and logged;
//! they never travel back to the producer.

use tokio::sync::mpsc;

use crate::{AuditEntry, AuditLogError, store::AuditLogStore};

/// Creates a connected outbox / inbox pair.
pub fn outbox() -> (AuditOutbox, AuditInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AuditOutbox { tx }, AuditInbox { rx })
}

/// Sending side of the audit outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditOutbox {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditOutbox {
    /// Queues an entry for recording.
    ///
    /// Never fails; a closed outbox only produces a debug event.
    pub fn emit(&self, entry: AuditEntry) {
        if let Err(mpsc::error::SendError(entry)) = self.tx.send(entry) {
            tracing::debug!(
                log_type = %entry.log_type,
                target_id = %entry.target_id,
                "audit outbox closed, entry discarded"
            );
            metrics::counter!("audit_entries_dropped_total").increment(1);
        }
    }

    /// Returns true once the recorder side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of the audit outbox.
#[derive(Debug)]
pub struct AuditInbox {
    rx: mpsc::UnboundedReceiver<AuditEntry>,
}

/// Drains the outbox into a store.
pub struct AuditRecorder<S: AuditLogStore> {
    inbox: AuditInbox,
    store: S,
}

impl<S: AuditLogStore> AuditRecorder<S> {
    /// Creates a recorder writing into `store`.
    pub fn new(inbox: AuditInbox, store: S) -> Self {
        Self { inbox, store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records entries until every outbox handle has been dropped.
    pub async fn run(mut self) {
        while let Some(entry) = self.inbox.rx.recv().await {
            self.record(entry).await;
        }
        tracing::info!("audit outbox closed, recorder stopping");
    }

    /// Records every entry currently queued without waiting for more.
    ///
    /// Returns the number of entries taken from the outbox.
    pub async fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(entry) = self.inbox.rx.try_recv() {
            self.record(entry).await;
            drained += 1;
        }
        drained
    }

    async fn record(&self, entry: AuditEntry) {
        let log_type = entry.log_type;
        let target_id = entry.target_id.clone();

        match self.store.append(entry).await {
            Ok(()) => {
                metrics::counter!("audit_entries_recorded_total").increment(1);
            }
            Err(e) if e.is_expected() => {
                metrics::counter!("audit_entries_dropped_total").increment(1);
            }
            Err(e) => {
                metrics::counter!("audit_entries_dropped_total").increment(1);
                report_unexpected(&e, log_type.as_str(), &target_id);
            }
        }
    }
}

fn report_unexpected(error: &AuditLogError, log_type: &str, target_id: &str) {
    tracing::warn!(%error, log_type, target_id, "failed to record audit entry");
}
