//! Shared application state.

use audit_log::{AuditLogStore, AuditOutbox};
use domain::{
    CommissionService, GroupBuyService, InMemoryMarketStore, TracingNotifier, VisitTracker,
};

/// Engine services shared by all handlers.
///
/// The market, commission and visit services share one in-memory store. The
/// audit store is generic so the binary can pick Postgres or memory at startup.
pub struct AppState<A> {
    pub market: GroupBuyService<InMemoryMarketStore, TracingNotifier>,
    pub commissions: CommissionService<InMemoryMarketStore>,
    pub visits: VisitTracker<InMemoryMarketStore>,
    pub audit_log: A,
}

impl<A: AuditLogStore> AppState<A> {
    /// Wires every service to `store`, emitting audit entries into `audit`.
    pub fn new(store: InMemoryMarketStore, audit: AuditOutbox, audit_log: A) -> Self {
        Self {
            market: GroupBuyService::new(store.clone(), TracingNotifier, audit),
            commissions: CommissionService::new(store.clone()),
            visits: VisitTracker::new(store),
            audit_log,
        }
    }
}
