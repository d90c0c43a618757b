use std::collections::{BTreeMap, BTreeSet, HashMap};

use audit_log::AuditLogType;
use chrono::Utc;
use common::{GroupId, OrderId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::auth::{Action, Actor, Resource, authorize};
use crate::error::DomainError;
use crate::group::Group;
use crate::notify::StatusNotifier;
use crate::order::{
    NewOrderLine, OrderLine, ensure_user_minimum, submitted_total, validate_pricing,
};
use crate::store::{GroupCommit, MarketStore, MarketStoreExt};
use crate::value_objects::Money;

use super::{GroupBuyService, order_entry, record_rejection};

/// Who is cancelling a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelScope {
    /// The owner cancels; their remaining submitted total must stay at the minimum.
    Own,
    /// The organizer or an admin cancels; the per-user minimum is not checked.
    Privileged,
}

impl<S, N> GroupBuyService<S, N>
where
    S: MarketStore,
    N: StatusNotifier,
{
    /// Creates a batch of order lines.
    ///
    /// Lines are grouped by (user, group). Each pair's existing submitted total
    /// plus its new lines must reach the per-user minimum, otherwise nothing is
    /// written. Lines of one pair share a transaction id: `shared_key` when
    /// given, a fresh one otherwise.
    #[tracing::instrument(
        skip(self, actor, lines),
        fields(actor_id = %actor.id, lines = lines.len())
    )]
    pub async fn create_orders(
        &self,
        actor: &Actor,
        lines: Vec<NewOrderLine>,
        shared_key: Option<TransactionId>,
    ) -> Result<Vec<OrderId>, DomainError> {
        self.place_orders(actor, lines, shared_key)
            .await
            .inspect_err(|e| record_rejection("create_orders", e))
    }

    /// Changes quantity and unit price of the caller's own submitted line.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_user_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<OrderLine, DomainError> {
        self.edit_order(actor, order_id, quantity, unit_price)
            .await
            .inspect_err(|e| record_rejection("update_order", e))
    }

    /// Cancels one submitted line.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        scope: CancelScope,
    ) -> Result<(), DomainError> {
        self.remove_order(actor, order_id, scope)
            .await
            .inspect_err(|e| record_rejection("cancel_order", e))
    }

    /// Cancels several of the caller's submitted lines in one group at once.
    ///
    /// The caller's remaining submitted total must reach the minimum or be zero.
    #[tracing::instrument(skip(self, actor, order_ids), fields(actor_id = %actor.id))]
    pub async fn cancel_order_group(
        &self,
        actor: &Actor,
        order_ids: Vec<OrderId>,
    ) -> Result<(), DomainError> {
        self.remove_transaction(actor, order_ids)
            .await
            .inspect_err(|e| record_rejection("cancel_order_group", e))
    }

    async fn place_orders(
        &self,
        actor: &Actor,
        requests: Vec<NewOrderLine>,
        shared_key: Option<TransactionId>,
    ) -> Result<Vec<OrderId>, DomainError> {
        if requests.is_empty() {
            return Err(DomainError::Validation(
                "an order batch needs at least one line".into(),
            ));
        }
        for request in &requests {
            request.validate()?;
            authorize(actor, Action::PlaceOrder, Resource::owned_by(&request.user_id))?;
        }

        let group_ids: BTreeSet<GroupId> = requests.iter().map(|r| r.group_id).collect();
        let _guards = self.locks.lock_many(group_ids.iter().copied()).await;

        let mut groups = BTreeMap::new();
        let mut existing = HashMap::new();
        for &group_id in &group_ids {
            let group = self.store.require_group(group_id).await?;
            if !group.stage().accepts_order_changes() {
                return Err(DomainError::invalid_state(group.status(), "place orders"));
            }
            existing.insert(group_id, self.store.orders_for_group(group_id).await?);
            groups.insert(group_id, group);
        }

        let transactions = self.assign_transactions(&requests, shared_key).await?;

        let now = Utc::now();
        let mut pending: BTreeMap<GroupId, Vec<OrderLine>> = BTreeMap::new();
        let mut added: BTreeMap<(GroupId, UserId), Money> = BTreeMap::new();
        let mut created = Vec::with_capacity(requests.len());
        for request in &requests {
            let group = groups
                .get(&request.group_id)
                .ok_or_else(|| DomainError::not_found("Group", request.group_id))?;
            let item = group.menu_item(&request.product_id).ok_or_else(|| {
                DomainError::Validation(format!(
                    "product {} is not on the menu of group {}",
                    request.product_id,
                    group.id()
                ))
            })?;
            let pair = (request.group_id, request.user_id.clone());
            let transaction_id = transactions
                .get(&pair)
                .copied()
                .unwrap_or_else(TransactionId::new);

            let line = OrderLine::submit(request, item, transaction_id, now)?;
            let pair_total = added.entry(pair).or_default();
            *pair_total = pair_total.checked_add(line.total_price)?;
            created.push(line.id);
            pending.entry(request.group_id).or_default().push(line);
        }

        for ((group_id, user_id), new_total) in &added {
            let current = existing
                .get(group_id)
                .map(|lines| submitted_total(lines, user_id))
                .unwrap_or_default();
            ensure_user_minimum(current.checked_add(*new_total)?, user_id)?;
        }

        // Every group is updated in memory before the first commit, so a
        // rejected batch writes nothing.
        let mut staged = Vec::with_capacity(pending.len());
        for (group_id, lines) in pending {
            let mut group = groups
                .remove(&group_id)
                .ok_or_else(|| DomainError::not_found("Group", group_id))?;
            let batch_total = Money::try_sum(lines.iter().map(|l| l.total_price))?;
            let change = group.apply_total_delta(batch_total, now)?;
            staged.push((group, lines, batch_total, change));
        }

        for (group, lines, batch_total, change) in staged {
            let group_id = group.id();
            let group = self
                .commit(GroupCommit::group_only(group).with_upserts(lines.clone()))
                .await?;

            metrics::counter!("orders_created_total").increment(lines.len() as u64);
            for line in &lines {
                self.emit(
                    order_entry(AuditLogType::OrderCreated, actor, line)
                        .after(line.audit_state())
                        .metadata("product_id", serde_json::json!(line.product_id.as_str())),
                );
            }
            tracing::info!(
                %group_id,
                lines = lines.len(),
                total = %batch_total,
                "orders created"
            );

            if let Some(change) = change {
                self.announce(actor, &group, change, "order_created").await;
            }
        }

        Ok(created)
    }

    /// Maps each (group, user) pair of a batch to its transaction id.
    async fn assign_transactions(
        &self,
        requests: &[NewOrderLine],
        shared_key: Option<TransactionId>,
    ) -> Result<HashMap<(GroupId, UserId), TransactionId>, DomainError> {
        let pairs: BTreeSet<(GroupId, UserId)> = requests
            .iter()
            .map(|r| (r.group_id, r.user_id.clone()))
            .collect();

        let Some(key) = shared_key else {
            return Ok(pairs
                .into_iter()
                .map(|pair| (pair, TransactionId::new()))
                .collect());
        };

        if pairs.len() > 1 {
            return Err(DomainError::Validation(
                "a shared transaction key covers one user in one group".into(),
            ));
        }
        let joined = self.store.orders_in_transaction(key).await?;
        let mut assigned = HashMap::new();
        for pair in pairs {
            if joined
                .iter()
                .any(|line| line.group_id != pair.0 || line.user_id != pair.1)
            {
                return Err(DomainError::Validation(format!(
                    "transaction {key} belongs to another user or group"
                )));
            }
            assigned.insert(pair, key);
        }
        Ok(assigned)
    }

    async fn edit_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<OrderLine, DomainError> {
        validate_pricing(quantity, unit_price)?;
        let order = self.store.require_order(order_id).await?;
        authorize(actor, Action::ModifyOwnOrder, Resource::owned_by(&order.user_id))?;

        let _guard = self.locks.lock(order.group_id).await;
        let order = self.store.require_order(order_id).await?;
        let mut group = self.store.require_group(order.group_id).await?;
        require_submitted(&order, &group, "edit the order")?;

        let user_lines = self.store.user_orders(group.id(), &order.user_id).await?;
        let others = submitted_total(
            user_lines.iter().filter(|l| l.id != order.id),
            &order.user_id,
        );
        ensure_user_minimum(
            others.checked_add(unit_price.multiply(quantity)?)?,
            &order.user_id,
        )?;

        let now = Utc::now();
        let before = order.clone();
        let mut updated = order;
        updated.reprice(quantity, unit_price, now)?;

        let delta = updated.total_price.checked_sub(before.total_price)?;
        let change = group.apply_total_delta(delta, now)?;
        let group = self
            .commit(GroupCommit::group_only(group).with_upserts(vec![updated.clone()]))
            .await?;

        let mut changed = Vec::new();
        if before.quantity != updated.quantity {
            changed.push("quantity");
        }
        if before.unit_price != updated.unit_price {
            changed.push("unit_price");
        }
        if before.total_price != updated.total_price {
            changed.push("total_price");
        }
        self.emit(
            order_entry(AuditLogType::OrderUpdated, actor, &updated)
                .before(before.audit_state())
                .after(updated.audit_state())
                .changed_fields(changed),
        );

        if let Some(change) = change {
            self.announce(actor, &group, change, "order_updated").await;
        }
        Ok(updated)
    }

    async fn remove_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        scope: CancelScope,
    ) -> Result<(), DomainError> {
        let order = self.store.require_order(order_id).await?;
        match scope {
            CancelScope::Own => {
                authorize(actor, Action::ModifyOwnOrder, Resource::owned_by(&order.user_id))?;
            }
            CancelScope::Privileged => {
                let group = self.store.require_group(order.group_id).await?;
                authorize(
                    actor,
                    Action::CancelOrderPrivileged,
                    Resource::group(group.organizer_id()),
                )?;
            }
        }

        let _guard = self.locks.lock(order.group_id).await;
        let order = self.store.require_order(order_id).await?;
        let group = self.store.require_group(order.group_id).await?;
        require_submitted(&order, &group, "cancel the order")?;

        if scope == CancelScope::Own {
            let user_lines = self.store.user_orders(group.id(), &order.user_id).await?;
            let remaining = submitted_total(
                user_lines.iter().filter(|l| l.id != order.id),
                &order.user_id,
            );
            ensure_user_minimum(remaining, &order.user_id)?;
        }

        self.commit_removal(actor, group, vec![order], "order_cancelled")
            .await
    }

    async fn remove_transaction(
        &self,
        actor: &Actor,
        order_ids: Vec<OrderId>,
    ) -> Result<(), DomainError> {
        let ids: BTreeSet<OrderId> = order_ids.into_iter().collect();
        let Some(&first) = ids.first() else {
            return Err(DomainError::Validation(
                "no orders given to cancel".into(),
            ));
        };

        let group_id = self.store.require_order(first).await?.group_id;
        let _guard = self.locks.lock(group_id).await;

        let mut orders = Vec::with_capacity(ids.len());
        for &id in &ids {
            let order = self.store.require_order(id).await?;
            if order.group_id != group_id {
                return Err(DomainError::Validation(
                    "orders to cancel together must belong to one group".into(),
                ));
            }
            authorize(actor, Action::ModifyOwnOrder, Resource::owned_by(&order.user_id))?;
            orders.push(order);
        }

        let group = self.store.require_group(group_id).await?;
        for order in &orders {
            require_submitted(order, &group, "cancel the orders")?;
        }

        let user_lines = self.store.user_orders(group_id, &actor.id).await?;
        let remaining = submitted_total(
            user_lines.iter().filter(|l| !ids.contains(&l.id)),
            &actor.id,
        );
        if !remaining.is_zero() {
            ensure_user_minimum(remaining, &actor.id)?;
        }

        self.commit_removal(actor, group, orders, "order_group_cancelled")
            .await
    }

    async fn commit_removal(
        &self,
        actor: &Actor,
        mut group: Group,
        orders: Vec<OrderLine>,
        trigger: &'static str,
    ) -> Result<(), DomainError> {
        let now = Utc::now();
        let removed = Money::try_sum(orders.iter().map(|o| o.total_price))?;
        let change = group.apply_total_delta(Money::zero().checked_sub(removed)?, now)?;
        let deletes = orders.iter().map(|o| o.id).collect();
        let group = self
            .commit(GroupCommit::group_only(group).with_deletes(deletes))
            .await?;

        for order in &orders {
            self.emit(
                order_entry(AuditLogType::OrderCancelled, actor, order)
                    .before(order.audit_state())
                    .after(serde_json::json!({ "quantity": 0, "total_price": 0 })),
            );
        }
        tracing::info!(
            group_id = %group.id(),
            lines = orders.len(),
            total = %removed,
            "orders cancelled"
        );

        if let Some(change) = change {
            self.announce(actor, &group, change, trigger).await;
        }
        Ok(())
    }
}

fn require_submitted(
    order: &OrderLine,
    group: &Group,
    action: &'static str,
) -> Result<(), DomainError> {
    if order.is_submitted() && group.stage().accepts_order_changes() {
        Ok(())
    } else {
        Err(DomainError::invalid_state(order.status, action))
    }
}

#[cfg(test)]
mod tests {
    use audit_log::{AuditRecorder, InMemoryAuditLogStore, outbox};

    use super::*;
    use crate::auth::Role;
    use crate::group::{GroupStatus, NewGroup};
    use crate::notify::InMemoryNotifier;
    use crate::store::InMemoryMarketStore;
    use crate::value_objects::{DeliveryInfo, MenuItem, ProductId};

    type Service = GroupBuyService<InMemoryMarketStore, InMemoryNotifier>;

    struct Fixture {
        service: Service,
        recorder: AuditRecorder<InMemoryAuditLogStore>,
        notifier: InMemoryNotifier,
        group: Group,
    }

    fn organizer() -> Actor {
        Actor::new("organizer-1", "Kim", Role::Organizer)
    }

    fn buyer(id: &str) -> Actor {
        Actor::new(id, id, Role::Buyer)
    }

    async fn open_group(service: &Service, title: &str) -> Group {
        service
            .create_group(
                &organizer(),
                NewGroup {
                    title: title.into(),
                    organizer_id: UserId::new("organizer-1"),
                    organizer_name: "Kim".into(),
                    menu_items: vec![
                        MenuItem::snapshot(
                            "P-1",
                            "Hallabong",
                            Money::won(10_000),
                            Money::won(12_000),
                        ),
                        MenuItem::snapshot(
                            "P-2",
                            "Tangerine",
                            Money::won(5_000),
                            Money::won(5_000),
                        ),
                    ],
                    start_date: None,
                    end_date: None,
                    delivery: DeliveryInfo::default(),
                },
            )
            .await
            .unwrap()
    }

    async fn fixture() -> Fixture {
        let (audit, inbox) = outbox();
        let recorder = AuditRecorder::new(inbox, InMemoryAuditLogStore::new());
        let notifier = InMemoryNotifier::new();
        let service = GroupBuyService::new(InMemoryMarketStore::new(), notifier.clone(), audit);
        let group = open_group(&service, "Jeju citrus").await;
        Fixture {
            service,
            recorder,
            notifier,
            group,
        }
    }

    fn line(
        group: &Group,
        user: &str,
        product: &str,
        quantity: u32,
        unit_price: i64,
    ) -> NewOrderLine {
        NewOrderLine {
            group_id: group.id(),
            user_id: UserId::new(user),
            user_name: user.to_string(),
            product_id: ProductId::new(product),
            quantity,
            unit_price: Money::won(unit_price),
        }
    }

    #[tokio::test]
    async fn batch_below_user_minimum_writes_nothing() {
        let f = fixture().await;

        let err = f
            .service
            .create_orders(&buyer("u1"), vec![line(&f.group, "u1", "P-2", 1, 5_000)], None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::ThresholdViolation(_)));
        assert_eq!(f.service.store().order_count().await, 0);
        assert_eq!(
            f.service.get_group(f.group.id()).await.unwrap().current_total(),
            Money::zero()
        );
    }

    #[tokio::test]
    async fn batch_lines_share_a_transaction() {
        let f = fixture().await;

        let ids = f
            .service
            .create_orders(
                &buyer("u1"),
                vec![
                    line(&f.group, "u1", "P-1", 1, 10_000),
                    line(&f.group, "u1", "P-2", 2, 5_000),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let transactions = f
            .service
            .user_order_transactions(f.group.id(), &UserId::new("u1"))
            .await
            .unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].total, Money::won(20_000));
    }

    #[tokio::test]
    async fn shared_key_joins_existing_transaction() {
        let f = fixture().await;
        let u1 = buyer("u1");

        let ids = f
            .service
            .create_orders(&u1, vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();
        let first = f.service.store().require_order(ids[0]).await.unwrap();

        f.service
            .create_orders(
                &u1,
                vec![line(&f.group, "u1", "P-2", 1, 5_000)],
                Some(first.transaction_id),
            )
            .await
            .unwrap();

        let transactions = f
            .service
            .user_order_transactions(f.group.id(), &u1.id)
            .await
            .unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].lines.len(), 2);

        let err = f
            .service
            .create_orders(
                &buyer("u2"),
                vec![line(&f.group, "u2", "P-1", 1, 10_000)],
                Some(first.transaction_id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create_orders(&buyer("u1"), vec![line(&f.group, "u1", "P-9", 1, 10_000)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn buyers_cannot_order_for_others() {
        let f = fixture().await;
        let err = f
            .service
            .create_orders(&buyer("u1"), vec![line(&f.group, "u2", "P-1", 1, 10_000)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn update_adjusts_total_and_audits_diff() {
        let mut f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(&u1, vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();
        f.recorder.drain().await;

        let updated = f
            .service
            .update_user_order(&u1, ids[0], 3, Money::won(10_000))
            .await
            .unwrap();
        assert_eq!(updated.total_price, Money::won(30_000));

        let group = f.service.get_group(f.group.id()).await.unwrap();
        assert_eq!(group.current_total(), Money::won(30_000));

        f.recorder.drain().await;
        let entries = f.recorder.store().entries().await;
        let entry = entries
            .iter()
            .find(|e| e.log_type == AuditLogType::OrderUpdated)
            .unwrap();
        assert_eq!(
            entry.changed_fields,
            Some(vec!["quantity".to_string(), "total_price".to_string()])
        );
        assert_eq!(entry.before.as_ref().unwrap()["total_price"], 10_000);
    }

    #[tokio::test]
    async fn update_below_minimum_is_rejected() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(&u1, vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();

        let err = f
            .service
            .update_user_order(&u1, ids[0], 1, Money::won(9_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ThresholdViolation(_)));
    }

    #[tokio::test]
    async fn only_owner_may_update() {
        let f = fixture().await;
        let ids = f
            .service
            .create_orders(&buyer("u1"), vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();

        let err = f
            .service
            .update_user_order(&buyer("u2"), ids[0], 2, Money::won(10_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn own_cancel_has_no_zero_exception() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(&u1, vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();

        let err = f
            .service
            .cancel_order(&u1, ids[0], CancelScope::Own)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ThresholdViolation(_)));
    }

    #[tokio::test]
    async fn own_cancel_keeping_minimum_succeeds() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(
                &u1,
                vec![
                    line(&f.group, "u1", "P-1", 1, 10_000),
                    line(&f.group, "u1", "P-2", 1, 5_000),
                ],
                None,
            )
            .await
            .unwrap();

        f.service
            .cancel_order(&u1, ids[1], CancelScope::Own)
            .await
            .unwrap();

        let group = f.service.get_group(f.group.id()).await.unwrap();
        assert_eq!(group.current_total(), Money::won(10_000));
    }

    #[tokio::test]
    async fn privileged_cancel_skips_minimum() {
        let f = fixture().await;
        let ids = f
            .service
            .create_orders(&buyer("u1"), vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();

        let err = f
            .service
            .cancel_order(&buyer("u2"), ids[0], CancelScope::Privileged)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));

        f.service
            .cancel_order(&organizer(), ids[0], CancelScope::Privileged)
            .await
            .unwrap();
        assert_eq!(f.service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn group_cancel_allows_zero_remaining() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(
                &u1,
                vec![
                    line(&f.group, "u1", "P-1", 1, 10_000),
                    line(&f.group, "u1", "P-2", 1, 5_000),
                ],
                None,
            )
            .await
            .unwrap();

        f.service.cancel_order_group(&u1, ids).await.unwrap();

        let group = f.service.get_group(f.group.id()).await.unwrap();
        assert_eq!(group.current_total(), Money::zero());
    }

    #[tokio::test]
    async fn group_cancel_rejects_partial_below_minimum() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(
                &u1,
                vec![
                    line(&f.group, "u1", "P-1", 1, 10_000),
                    line(&f.group, "u1", "P-2", 1, 5_000),
                ],
                None,
            )
            .await
            .unwrap();

        let err = f
            .service
            .cancel_order_group(&u1, vec![ids[0]])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ThresholdViolation(_)));

        let err = f.service.cancel_order_group(&u1, vec![]).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn reaching_goal_notifies_and_audits() {
        let mut f = fixture().await;
        f.service
            .create_orders(
                &buyer("u1"),
                vec![line(&f.group, "u1", "P-1", 4, 10_000)],
                None,
            )
            .await
            .unwrap();

        let sent = f.notifier.notifications().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].old_status, GroupStatus::Open);
        assert_eq!(sent[0].new_status, GroupStatus::Achieved);

        f.recorder.drain().await;
        let entries = f.recorder.store().entries().await;
        assert!(entries
            .iter()
            .any(|e| e.log_type == AuditLogType::GroupStatusChanged));
    }

    #[tokio::test]
    async fn overflowing_batch_is_rejected_without_writes() {
        let f = fixture().await;

        let err = f
            .service
            .create_orders(
                &buyer("u1"),
                vec![line(&f.group, "u1", "P-1", 4, i64::MAX / 2)],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = f
            .service
            .create_orders(
                &buyer("u1"),
                vec![
                    line(&f.group, "u1", "P-1", 1, i64::MAX / 2 + 1),
                    line(&f.group, "u1", "P-2", 1, i64::MAX / 2 + 1),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!(f.service.store().order_count().await, 0);
        assert_eq!(
            f.service.get_group(f.group.id()).await.unwrap().current_total(),
            Money::zero()
        );
    }

    #[tokio::test]
    async fn overflowing_update_is_rejected() {
        let f = fixture().await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(&u1, vec![line(&f.group, "u1", "P-1", 1, 10_000)], None)
            .await
            .unwrap();

        let err = f
            .service
            .update_user_order(&u1, ids[0], 3, Money::won(i64::MAX / 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let stored = f.service.store().require_order(ids[0]).await.unwrap();
        assert_eq!(stored.total_price, Money::won(10_000));
        assert_eq!(
            f.service.get_group(f.group.id()).await.unwrap().current_total(),
            Money::won(10_000)
        );
    }

    #[tokio::test]
    async fn batch_spanning_groups_updates_each_group() {
        let f = fixture().await;
        let second = open_group(&f.service, "Jeju greens").await;

        f.service
            .create_orders(
                &buyer("u1"),
                vec![
                    line(&f.group, "u1", "P-1", 4, 10_000),
                    line(&second, "u1", "P-1", 1, 10_000),
                    line(&second, "u1", "P-2", 1, 5_000),
                ],
                None,
            )
            .await
            .unwrap();

        let first = f.service.get_group(f.group.id()).await.unwrap();
        assert_eq!(first.current_total(), Money::won(40_000));
        assert_eq!(first.status(), GroupStatus::Achieved);

        let second = f.service.get_group(second.id()).await.unwrap();
        assert_eq!(second.current_total(), Money::won(15_000));
        assert_eq!(second.status(), GroupStatus::Open);

        let first_tx = f
            .service
            .user_order_transactions(first.id(), &UserId::new("u1"))
            .await
            .unwrap();
        let second_tx = f
            .service
            .user_order_transactions(second.id(), &UserId::new("u1"))
            .await
            .unwrap();
        assert_eq!(first_tx.len(), 1);
        assert_eq!(second_tx.len(), 1);
        assert_ne!(first_tx[0].transaction_id, second_tx[0].transaction_id);
    }

    #[tokio::test]
    async fn batch_fails_whole_when_second_group_misses_minimum() {
        let f = fixture().await;
        let second = open_group(&f.service, "Jeju greens").await;

        let err = f
            .service
            .create_orders(
                &buyer("u1"),
                vec![
                    line(&f.group, "u1", "P-1", 2, 10_000),
                    line(&second, "u1", "P-2", 1, 5_000),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ThresholdViolation(_)));

        assert_eq!(f.service.store().order_count().await, 0);
        for id in [f.group.id(), second.id()] {
            let group = f.service.get_group(id).await.unwrap();
            assert_eq!(group.current_total(), Money::zero());
            assert_eq!(group.status(), GroupStatus::Open);
        }
        assert!(f.notifier.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn group_cancel_across_groups_is_rejected() {
        let f = fixture().await;
        let second = open_group(&f.service, "Jeju greens").await;
        let u1 = buyer("u1");
        let ids = f
            .service
            .create_orders(
                &u1,
                vec![
                    line(&f.group, "u1", "P-1", 1, 10_000),
                    line(&second, "u1", "P-1", 1, 10_000),
                ],
                None,
            )
            .await
            .unwrap();

        let err = f
            .service
            .cancel_order_group(&u1, ids.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(f.service.store().order_count().await, 2);
    }

    #[tokio::test]
    async fn opposite_batches_over_two_groups_do_not_deadlock() {
        let f = fixture().await;
        let second = open_group(&f.service, "Jeju greens").await;
        let service = std::sync::Arc::new(f.service);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let user = format!("u{i}");
            let (a, b) = if i % 2 == 0 {
                (f.group.clone(), second.clone())
            } else {
                (second.clone(), f.group.clone())
            };
            tasks.push(tokio::spawn(async move {
                service
                    .create_orders(
                        &buyer(&user),
                        vec![
                            line(&a, &user, "P-1", 1, 10_000),
                            line(&b, &user, "P-1", 1, 10_000),
                        ],
                        None,
                    )
                    .await
            }));
        }

        let all = async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), all)
            .await
            .unwrap();

        for id in [f.group.id(), second.id()] {
            let group = service.get_group(id).await.unwrap();
            assert_eq!(group.current_total(), Money::won(80_000));
        }
    }
}
