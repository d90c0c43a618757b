use audit_log::AuditLogType;
use chrono::{DateTime, Utc};
use common::{GroupId, UserId};

use crate::auth::{Action, Actor, Resource, authorize};
use crate::error::DomainError;
use crate::group::{DeliveryStage, Group, GroupDetailsUpdate, NewGroup, StageChange};
use crate::notify::StatusNotifier;
use crate::order::{OrderLine, OrderTransaction};
use crate::store::{GroupCommit, MarketStore, MarketStoreExt};

use super::{GroupBuyService, group_entry};

impl<S, N> GroupBuyService<S, N>
where
    S: MarketStore,
    N: StatusNotifier,
{
    /// Creates a group in the open stage.
    ///
    /// Organizers create groups for themselves; an admin may create one on
    /// behalf of any organizer.
    #[tracing::instrument(
        skip(self, actor, input),
        fields(actor_id = %actor.id, title = %input.title)
    )]
    pub async fn create_group(&self, actor: &Actor, input: NewGroup) -> Result<Group, DomainError> {
        authorize(actor, Action::CreateGroup, Resource::none())?;
        if input.organizer_id != actor.id {
            authorize(actor, Action::EditGroup, Resource::group(&input.organizer_id))?;
        }

        let group = Group::create(input, Utc::now())?;
        self.store.insert_group(group.clone()).await?;

        self.emit(
            group_entry(AuditLogType::GroupCreated, actor, &group)
                .after(group.audit_state())
                .metadata(
                    "menu_items",
                    serde_json::json!(group.menu_items().len()),
                ),
        );
        tracing::info!(group_id = %group.id(), "group created");
        Ok(group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> Result<Group, DomainError> {
        Ok(self.store.require_group(group_id).await?)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, DomainError> {
        Ok(self.store.list_groups().await?)
    }

    /// All lines of an existing group.
    pub async fn orders_for_group(&self, group_id: GroupId) -> Result<Vec<OrderLine>, DomainError> {
        self.store.require_group(group_id).await?;
        Ok(self.store.orders_for_group(group_id).await?)
    }

    /// A user's lines in one group, clustered by transaction.
    pub async fn user_order_transactions(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<Vec<OrderTransaction>, DomainError> {
        self.store.require_group(group_id).await?;
        let lines = self.store.user_orders(group_id, user_id).await?;
        Ok(OrderTransaction::group_lines(lines))
    }

    /// Achieved → Confirmed.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn confirm_group(
        &self,
        actor: &Actor,
        group_id: GroupId,
    ) -> Result<Group, DomainError> {
        self.transition(actor, group_id, Action::ConfirmGroup, "confirm", |g, now| {
            g.confirm(now).map(Some)
        })
        .await
    }

    /// Confirmed → Achieved.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn cancel_confirm_group(
        &self,
        actor: &Actor,
        group_id: GroupId,
    ) -> Result<Group, DomainError> {
        self.transition(
            actor,
            group_id,
            Action::CancelConfirmation,
            "cancel_confirm",
            |g, now| g.cancel_confirmation(now).map(Some),
        )
        .await
    }

    /// Confirmed → Shipping.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn mark_shipping(
        &self,
        actor: &Actor,
        group_id: GroupId,
    ) -> Result<Group, DomainError> {
        self.transition(actor, group_id, Action::AdvanceDelivery, "mark_shipping", |g, now| {
            g.mark_shipping(now).map(Some)
        })
        .await
    }

    /// Shipping → Done.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn mark_complete(
        &self,
        actor: &Actor,
        group_id: GroupId,
    ) -> Result<Group, DomainError> {
        self.transition(actor, group_id, Action::AdvanceDelivery, "mark_complete", |g, now| {
            g.mark_complete(now).map(Some)
        })
        .await
    }

    /// Moves the delivery sub-stage; reaching delivered completes the group.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_delivery_stage(
        &self,
        actor: &Actor,
        group_id: GroupId,
        stage: DeliveryStage,
    ) -> Result<Group, DomainError> {
        self.transition(
            actor,
            group_id,
            Action::AdvanceDelivery,
            "delivery_stage",
            move |g, now| g.set_delivery_stage(stage, now),
        )
        .await
    }

    /// Deletes an open or achieved group together with all of its orders.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete_group(&self, actor: &Actor, group_id: GroupId) -> Result<(), DomainError> {
        let guard = self.locks.lock(group_id).await;
        let group = self.store.require_group(group_id).await?;
        authorize(actor, Action::DeleteGroup, Resource::group(group.organizer_id()))?;
        if !group.stage().can_delete() {
            return Err(DomainError::invalid_state(group.status(), "delete the group"));
        }

        let removed = self.store.delete_group(group_id, group.version()).await?;
        drop(guard);
        self.locks.forget(group_id).await;

        self.emit(
            group_entry(AuditLogType::GroupDeleted, actor, &group)
                .before(group.audit_state())
                .metadata("deleted_orders", serde_json::json!(removed.len())),
        );
        tracing::info!(%group_id, deleted_orders = removed.len(), "group deleted");
        Ok(())
    }

    /// Changes the recruitment window.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_group_dates(
        &self,
        actor: &Actor,
        group_id: GroupId,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Group, DomainError> {
        self.edit(actor, group_id, move |g, now| {
            g.reschedule(start_date, end_date, now)
        })
        .await
    }

    /// Changes the title or delivery details.
    #[tracing::instrument(skip(self, actor, update), fields(actor_id = %actor.id))]
    pub async fn update_group_details(
        &self,
        actor: &Actor,
        group_id: GroupId,
        update: GroupDetailsUpdate,
    ) -> Result<Group, DomainError> {
        self.edit(actor, group_id, move |g, now| g.update_details(update, now))
            .await
    }

    async fn transition<F>(
        &self,
        actor: &Actor,
        group_id: GroupId,
        action: Action,
        trigger: &'static str,
        apply: F,
    ) -> Result<Group, DomainError>
    where
        F: FnOnce(&mut Group, DateTime<Utc>) -> Result<Option<StageChange>, DomainError> + Send,
    {
        let _guard = self.locks.lock(group_id).await;
        let mut group = self.store.require_group(group_id).await?;
        authorize(actor, action, Resource::group(group.organizer_id()))?;

        let now = Utc::now();
        let Some(change) = apply(&mut group, now)? else {
            return Ok(group);
        };
        let restamped = self.restamp_orders(&group, &change, now).await?;
        let group = self
            .commit(GroupCommit::group_only(group).with_upserts(restamped))
            .await?;

        self.announce(actor, &group, change, trigger).await;
        Ok(group)
    }

    async fn edit<F>(
        &self,
        actor: &Actor,
        group_id: GroupId,
        apply: F,
    ) -> Result<Group, DomainError>
    where
        F: FnOnce(&mut Group, DateTime<Utc>) -> Result<Vec<&'static str>, DomainError> + Send,
    {
        let _guard = self.locks.lock(group_id).await;
        let mut group = self.store.require_group(group_id).await?;
        authorize(actor, Action::EditGroup, Resource::group(group.organizer_id()))?;

        let before = group.audit_state();
        let changed = apply(&mut group, Utc::now())?;
        if changed.is_empty() {
            return Ok(group);
        }
        let group = self.commit(GroupCommit::group_only(group)).await?;

        self.emit(
            group_entry(AuditLogType::GroupUpdated, actor, &group)
                .before(before)
                .after(group.audit_state())
                .changed_fields(changed),
        );
        Ok(group)
    }
}
