use chrono::{DateTime, Duration, Utc};
use common::{GroupId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{DeliveryInfo, GROUP_MINIMUM_TOTAL, MenuItem, Money, ProductId};

use super::events::StageChange;
use super::state::{DeliveryStage, GroupStage, GroupStatus, OrderStatus};

/// Recruitment window applied when no end date is given.
pub const DEFAULT_RECRUITMENT_DAYS: i64 = 7;

/// Input for creating a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
    pub title: String,
    pub organizer_id: UserId,
    pub organizer_name: String,
    pub menu_items: Vec<MenuItem>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery: DeliveryInfo,
}

/// Editable descriptive fields of a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupDetailsUpdate {
    pub title: Option<String>,
    pub delivery: Option<DeliveryInfo>,
}

/// A group-buying campaign.
///
/// Owns the running order total and the lifecycle stage. Every mutating method
/// either applies completely or returns an error without touching `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    title: String,
    organizer_id: UserId,
    organizer_name: String,
    menu_items: Vec<MenuItem>,
    minimum_total: Money,
    current_total: Money,
    stage: GroupStage,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    delivery: DeliveryInfo,
    shipping_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: Version,
}

impl Group {
    /// Validates the input and creates a group in the open stage.
    pub fn create(input: NewGroup, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::Validation("title must not be empty".into()));
        }
        if input.menu_items.is_empty() {
            return Err(DomainError::Validation(
                "a group needs at least one menu item".into(),
            ));
        }
        for item in &input.menu_items {
            validate_menu_item(item)?;
        }

        let start_date = input.start_date.unwrap_or(now);
        let end_date = input
            .end_date
            .unwrap_or(start_date + Duration::days(DEFAULT_RECRUITMENT_DAYS));
        validate_start(start_date, now)?;
        validate_window(start_date, end_date)?;

        Ok(Self {
            id: GroupId::new(),
            title,
            organizer_id: input.organizer_id,
            organizer_name: input.organizer_name,
            menu_items: input.menu_items,
            minimum_total: GROUP_MINIMUM_TOTAL,
            current_total: Money::zero(),
            stage: GroupStage::Open,
            start_date,
            end_date,
            delivery: input.delivery,
            shipping_started_at: None,
            created_at: now,
            updated_at: now,
            version: Version::first(),
        })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn organizer_id(&self) -> &UserId {
        &self.organizer_id
    }

    pub fn organizer_name(&self) -> &str {
        &self.organizer_name
    }

    pub fn menu_items(&self) -> &[MenuItem] {
        &self.menu_items
    }

    /// Looks up a product in the menu snapshot.
    pub fn menu_item(&self, product_id: &ProductId) -> Option<&MenuItem> {
        self.menu_items.iter().find(|m| &m.product_id == product_id)
    }

    pub fn minimum_total(&self) -> Money {
        self.minimum_total
    }

    pub fn current_total(&self) -> Money {
        self.current_total
    }

    pub fn stage(&self) -> GroupStage {
        self.stage
    }

    pub fn status(&self) -> GroupStatus {
        self.stage.status()
    }

    pub fn delivery_stage(&self) -> Option<DeliveryStage> {
        self.stage.delivery_stage()
    }

    /// Status every order of this group must carry.
    pub fn order_status(&self) -> OrderStatus {
        OrderStatus::for_group(self.status())
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    pub fn shipping_started_at(&self) -> Option<DateTime<Utc>> {
        self.shipping_started_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Adds `delta` to the running total and re-evaluates the funding goal.
    ///
    /// Leaves the group untouched if the total would overflow.
    pub fn apply_total_delta(
        &mut self,
        delta: Money,
        now: DateTime<Utc>,
    ) -> Result<Option<StageChange>, DomainError> {
        self.current_total = self.current_total.checked_add(delta)?;
        self.updated_at = now;
        Ok(self.reevaluate_funding())
    }

    /// Toggles between open and achieved. No effect in any other stage.
    fn reevaluate_funding(&mut self) -> Option<StageChange> {
        let reached = self.current_total >= self.minimum_total;
        let target = match self.stage {
            GroupStage::Open if reached => GroupStage::Achieved,
            GroupStage::Achieved if !reached => GroupStage::Open,
            _ => return None,
        };
        Some(self.move_to(target))
    }

    /// Achieved → Confirmed.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<StageChange, DomainError> {
        self.require(GroupStage::Achieved, "confirm the group")?;
        self.updated_at = now;
        Ok(self.move_to(GroupStage::Confirmed))
    }

    /// Confirmed → Achieved.
    pub fn cancel_confirmation(&mut self, now: DateTime<Utc>) -> Result<StageChange, DomainError> {
        self.require(GroupStage::Confirmed, "cancel the confirmation")?;
        self.updated_at = now;
        Ok(self.move_to(GroupStage::Achieved))
    }

    /// Confirmed → Shipping, starting at the payment notice sub-stage.
    pub fn mark_shipping(&mut self, now: DateTime<Utc>) -> Result<StageChange, DomainError> {
        self.require(GroupStage::Confirmed, "start shipping")?;
        self.shipping_started_at = Some(now);
        self.updated_at = now;
        Ok(self.move_to(GroupStage::Delivery(DeliveryStage::PaymentNotice)))
    }

    /// Shipping → Done.
    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> Result<StageChange, DomainError> {
        if self.status() != GroupStatus::Shipping {
            return Err(DomainError::invalid_state(self.status(), "complete delivery"));
        }
        self.updated_at = now;
        Ok(self.move_to(GroupStage::Delivery(DeliveryStage::Delivered)))
    }

    /// Moves the delivery sub-stage.
    ///
    /// While shipping any sub-stage may be chosen; reaching delivered completes
    /// the group. A completed group may only regress to shipping-entered.
    /// Setting the current sub-stage again returns `Ok(None)`.
    pub fn set_delivery_stage(
        &mut self,
        stage: DeliveryStage,
        now: DateTime<Utc>,
    ) -> Result<Option<StageChange>, DomainError> {
        let current = match self.stage {
            GroupStage::Delivery(current) => current,
            _ => {
                return Err(DomainError::invalid_state(
                    self.status(),
                    "change the delivery stage",
                ));
            }
        };
        if current == stage {
            return Ok(None);
        }
        if current == DeliveryStage::Delivered && stage != DeliveryStage::ShippingEntered {
            return Err(DomainError::invalid_state(
                self.status(),
                "move delivery back further than shipping-entered",
            ));
        }
        self.updated_at = now;
        Ok(Some(self.move_to(GroupStage::Delivery(stage))))
    }

    /// Changes the recruitment window. Returns the names of changed fields.
    ///
    /// An unchanged start date already in the past is accepted.
    pub fn reschedule(
        &mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, DomainError> {
        self.require_editable("change the dates")?;

        let new_start = start_date.unwrap_or(self.start_date);
        let new_end = end_date.unwrap_or(self.end_date);
        if new_start != self.start_date {
            validate_start(new_start, now)?;
        }
        validate_window(new_start, new_end)?;

        let mut changed = Vec::new();
        if new_start != self.start_date {
            changed.push("start_date");
        }
        if new_end != self.end_date {
            changed.push("end_date");
        }
        if !changed.is_empty() {
            self.start_date = new_start;
            self.end_date = new_end;
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Updates the title and delivery details. Returns the names of changed fields.
    pub fn update_details(
        &mut self,
        update: GroupDetailsUpdate,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, DomainError> {
        self.require_editable("edit the group")?;

        let title = match update.title {
            Some(title) if title.trim().is_empty() => {
                return Err(DomainError::Validation("title must not be empty".into()));
            }
            Some(title) => Some(title.trim().to_string()),
            None => None,
        };

        let mut changed = Vec::new();
        if let Some(title) = title
            && title != self.title
        {
            self.title = title;
            changed.push("title");
        }
        if let Some(delivery) = update.delivery
            && delivery != self.delivery
        {
            self.delivery = delivery;
            changed.push("delivery");
        }
        if !changed.is_empty() {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// JSON view used for audit before/after payloads.
    pub(crate) fn audit_state(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "status": self.status().label(),
            "delivery_stage": self.delivery_stage().map(|s| s.label()),
            "current_total": self.current_total.amount(),
            "start_date": self.start_date,
            "end_date": self.end_date,
            "delivery": self.delivery,
        })
    }

    fn require(&self, expected: GroupStage, action: &'static str) -> Result<(), DomainError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(DomainError::invalid_state(self.status(), action))
        }
    }

    fn require_editable(&self, action: &'static str) -> Result<(), DomainError> {
        if self.stage.accepts_order_changes() {
            Ok(())
        } else {
            Err(DomainError::invalid_state(self.status(), action))
        }
    }

    fn move_to(&mut self, to: GroupStage) -> StageChange {
        let change = StageChange::new(self.stage, to);
        self.stage = to;
        change
    }
}

fn validate_menu_item(item: &MenuItem) -> Result<(), DomainError> {
    if !item.sale_price.is_positive() {
        return Err(DomainError::Validation(format!(
            "sale price of {} must be at least 1",
            item.product_id
        )));
    }
    if item.list_price.amount() < 0 {
        return Err(DomainError::Validation(format!(
            "list price of {} must not be negative",
            item.product_id
        )));
    }
    Ok(())
}

fn validate_start(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), DomainError> {
    if start.date_naive() < now.date_naive() {
        return Err(DomainError::Validation(
            "start date must not be in the past".into(),
        ));
    }
    Ok(())
}

fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DomainError> {
    if end - start < Duration::days(1) {
        return Err(DomainError::Validation(
            "end date must be at least one day after the start date".into(),
        ));
    }
    Ok(())
}
