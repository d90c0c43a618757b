use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use common::GroupId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-group mutexes serializing every mutation of one group.
#[derive(Clone, Default)]
pub struct GroupLocks {
    locks: Arc<Mutex<HashMap<GroupId, Arc<Mutex<()>>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, id: GroupId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    /// Waits for exclusive access to one group.
    pub async fn lock(&self, id: GroupId) -> OwnedMutexGuard<()> {
        self.handle(id).await.lock_owned().await
    }

    /// Locks several groups in ascending id order.
    pub async fn lock_many(
        &self,
        ids: impl IntoIterator<Item = GroupId>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let ordered: BTreeSet<GroupId> = ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Drops the mutex of a deleted group.
    pub async fn forget(&self, id: GroupId) {
        self.locks.lock().await.remove(&id);
    }
}
