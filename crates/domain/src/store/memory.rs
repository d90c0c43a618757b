use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GroupId, OrderId, TransactionId, UserId, Version};
use tokio::sync::RwLock;

use super::{GroupCommit, MarketStore, Result, SettingsStore, StoreError, VisitStore};
use crate::commission::{AdminSettings, CommissionRate};
use crate::group::Group;
use crate::order::OrderLine;
use crate::visit::UserGroupVisit;

#[derive(Default)]
struct MarketState {
    groups: Vec<Group>,
    orders: Vec<OrderLine>,
}

#[derive(Default)]
struct SettingsState {
    overrides: HashMap<UserId, CommissionRate>,
    admin: Option<AdminSettings>,
}

/// In-memory implementation of every store port, for tests and single-node runs.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    market: Arc<RwLock<MarketState>>,
    settings: Arc<RwLock<SettingsState>>,
    visits: Arc<RwLock<HashMap<(UserId, GroupId), UserGroupVisit>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryMarketStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of stored order lines across all groups.
    pub async fn order_count(&self) -> usize {
        self.market.read().await.orders.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn insert_group(&self, group: Group) -> Result<()> {
        self.check_available()?;
        self.market.write().await.groups.push(group);
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        self.check_available()?;
        let state = self.market.read().await;
        Ok(state.groups.iter().find(|g| g.id() == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        self.check_available()?;
        Ok(self.market.read().await.groups.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderLine>> {
        self.check_available()?;
        let state = self.market.read().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn orders_for_group(&self, group_id: GroupId) -> Result<Vec<OrderLine>> {
        self.check_available()?;
        let state = self.market.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn orders_in_transaction(&self, transaction_id: TransactionId) -> Result<Vec<OrderLine>> {
        self.check_available()?;
        let state = self.market.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn commit_group(&self, commit: GroupCommit) -> Result<Version> {
        self.check_available()?;
        let mut state = self.market.write().await;
        let group_id = commit.group.id();

        let stored = state
            .groups
            .iter_mut()
            .find(|g| g.id() == group_id)
            .ok_or(StoreError::GroupNotFound(group_id))?;

        if stored.version() != commit.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                group_id,
                expected: commit.expected_version,
                actual: stored.version(),
            });
        }

        let new_version = commit.expected_version.next();
        let mut group = commit.group;
        group.set_version(new_version);
        *stored = group;

        if !commit.deletes.is_empty() {
            state.orders.retain(|o| !commit.deletes.contains(&o.id));
        }
        for line in commit.upserts {
            match state.orders.iter_mut().find(|o| o.id == line.id) {
                Some(existing) => *existing = line,
                None => state.orders.push(line),
            }
        }

        Ok(new_version)
    }

    async fn delete_group(&self, id: GroupId, expected_version: Version) -> Result<Vec<OrderLine>> {
        self.check_available()?;
        let mut state = self.market.write().await;

        let index = state
            .groups
            .iter()
            .position(|g| g.id() == id)
            .ok_or(StoreError::GroupNotFound(id))?;
        let actual = state.groups[index].version();
        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                group_id: id,
                expected: expected_version,
                actual,
            });
        }

        state.groups.remove(index);
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.orders)
                .into_iter()
                .partition(|o| o.group_id == id);
        state.orders = kept;
        Ok(removed)
    }
}

#[async_trait]
impl SettingsStore for InMemoryMarketStore {
    async fn organizer_rate(&self, organizer_id: &UserId) -> Result<Option<CommissionRate>> {
        self.check_available()?;
        Ok(self.settings.read().await.overrides.get(organizer_id).copied())
    }

    async fn set_organizer_rate(&self, organizer_id: UserId, rate: CommissionRate) -> Result<()> {
        self.check_available()?;
        self.settings
            .write()
            .await
            .overrides
            .insert(organizer_id, rate);
        Ok(())
    }

    async fn delete_organizer_rate(&self, organizer_id: &UserId) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .settings
            .write()
            .await
            .overrides
            .remove(organizer_id)
            .is_some())
    }

    async fn admin_settings(&self) -> Result<AdminSettings> {
        self.check_available()?;
        Ok(self.settings.read().await.admin.unwrap_or_default())
    }

    async fn save_admin_settings(&self, settings: AdminSettings) -> Result<()> {
        self.check_available()?;
        self.settings.write().await.admin = Some(settings);
        Ok(())
    }
}

#[async_trait]
impl VisitStore for InMemoryMarketStore {
    async fn upsert_visit(
        &self,
        user_id: &UserId,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> Result<UserGroupVisit> {
        self.check_available()?;
        let mut visits = self.visits.write().await;
        let visit = visits
            .entry((user_id.clone(), group_id))
            .and_modify(|v| v.revisit(at))
            .or_insert_with(|| UserGroupVisit::first(user_id.clone(), group_id, at));
        Ok(visit.clone())
    }

    async fn get_visit(
        &self,
        user_id: &UserId,
        group_id: GroupId,
    ) -> Result<Option<UserGroupVisit>> {
        self.check_available()?;
        let visits = self.visits.read().await;
        Ok(visits.get(&(user_id.clone(), group_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::NewGroup;
    use crate::store::MarketStoreExt;
    use crate::value_objects::{DeliveryInfo, MenuItem, Money};

    fn group() -> Group {
        Group::create(
            NewGroup {
                title: "Peaches".into(),
                organizer_id: UserId::new("organizer-1"),
                organizer_name: "Kim".into(),
                menu_items: vec![MenuItem::snapshot(
                    "P-1",
                    "Peach 2kg",
                    Money::won(10_000),
                    Money::won(12_000),
                )],
                start_date: None,
                end_date: None,
                delivery: DeliveryInfo::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn commit_bumps_version() {
        let store = InMemoryMarketStore::new();
        let g = group();
        store.insert_group(g.clone()).await.unwrap();

        let version = store.commit_group(GroupCommit::group_only(g.clone())).await.unwrap();
        assert_eq!(version, Version::new(2));
        assert_eq!(store.require_group(g.id()).await.unwrap().version(), version);
    }

    #[tokio::test]
    async fn stale_commit_conflicts() {
        let store = InMemoryMarketStore::new();
        let g = group();
        store.insert_group(g.clone()).await.unwrap();

        store.commit_group(GroupCommit::group_only(g.clone())).await.unwrap();
        let err = store
            .commit_group(GroupCommit::group_only(g))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected, actual, .. }
                if expected == Version::first() && actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn missing_group_is_not_found() {
        let store = InMemoryMarketStore::new();
        let err = store.require_group(GroupId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::GroupNotFound(_)));
    }

    #[tokio::test]
    async fn unavailable_switch_fails_calls() {
        let store = InMemoryMarketStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_groups().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn admin_settings_default_until_saved() {
        let store = InMemoryMarketStore::new();
        assert_eq!(store.admin_settings().await.unwrap(), AdminSettings::default());
    }
}
