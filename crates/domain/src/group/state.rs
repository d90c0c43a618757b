//! Group lifecycle states.

use serde::{Deserialize, Serialize};

/// Coarse status of a group, as shown to buyers.
///
/// ```text
/// 진행중 ⇄ 달성 ⇄ 확정 ──► 배송중 ⇄ 완료
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupStatus {
    /// Collecting orders, funding goal not yet met.
    #[serde(rename = "진행중")]
    Open,

    /// Funding goal met, still accepting order changes.
    #[serde(rename = "달성")]
    Achieved,

    /// Organizer confirmed the purchase; orders are frozen.
    #[serde(rename = "확정")]
    Confirmed,

    /// Administrator is driving the delivery sub-stages.
    #[serde(rename = "배송중")]
    Shipping,

    /// Delivered.
    #[serde(rename = "완료")]
    Done,
}

impl GroupStatus {
    /// Returns the Korean label used on the wire and in audit entries.
    pub fn label(&self) -> &'static str {
        match self {
            GroupStatus::Open => "진행중",
            GroupStatus::Achieved => "달성",
            GroupStatus::Confirmed => "확정",
            GroupStatus::Shipping => "배송중",
            GroupStatus::Done => "완료",
        }
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fine-grained delivery progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeliveryStage {
    #[serde(rename = "입금안내")]
    PaymentNotice,
    #[serde(rename = "입금확인")]
    PaymentConfirmed,
    #[serde(rename = "상품준비")]
    Preparing,
    #[serde(rename = "배송입력")]
    ShippingEntered,
    #[serde(rename = "배송완료")]
    Delivered,
}

impl DeliveryStage {
    /// All stages in progress order.
    pub const ALL: [DeliveryStage; 5] = [
        DeliveryStage::PaymentNotice,
        DeliveryStage::PaymentConfirmed,
        DeliveryStage::Preparing,
        DeliveryStage::ShippingEntered,
        DeliveryStage::Delivered,
    ];

    /// Maps a sub-stage to the coarse status it implies.
    pub fn status(&self) -> GroupStatus {
        match self {
            DeliveryStage::Delivered => GroupStatus::Done,
            DeliveryStage::PaymentNotice
            | DeliveryStage::PaymentConfirmed
            | DeliveryStage::Preparing
            | DeliveryStage::ShippingEntered => GroupStatus::Shipping,
        }
    }

    /// Returns the Korean label.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStage::PaymentNotice => "입금안내",
            DeliveryStage::PaymentConfirmed => "입금확인",
            DeliveryStage::Preparing => "상품준비",
            DeliveryStage::ShippingEntered => "배송입력",
            DeliveryStage::Delivered => "배송완료",
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The single source of truth for where a group is in its lifecycle.
///
/// Both the coarse [`GroupStatus`] and the delivery sub-stage are derived
/// from this value, so they cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum GroupStage {
    #[default]
    Open,
    Achieved,
    Confirmed,
    Delivery(DeliveryStage),
}

impl GroupStage {
    /// Returns the coarse status.
    pub fn status(&self) -> GroupStatus {
        match self {
            GroupStage::Open => GroupStatus::Open,
            GroupStage::Achieved => GroupStatus::Achieved,
            GroupStage::Confirmed => GroupStatus::Confirmed,
            GroupStage::Delivery(stage) => stage.status(),
        }
    }

    /// Returns the delivery sub-stage, present only while shipping or done.
    pub fn delivery_stage(&self) -> Option<DeliveryStage> {
        match self {
            GroupStage::Delivery(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Returns true while orders may be placed, edited, or cancelled.
    pub fn accepts_order_changes(&self) -> bool {
        matches!(self, GroupStage::Open | GroupStage::Achieved)
    }

    /// Returns true while the group may be deleted.
    pub fn can_delete(&self) -> bool {
        self.accepts_order_changes()
    }
}

/// Status label carried by every order line, mirroring its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "주문완료")]
    Submitted,
    #[serde(rename = "확정")]
    Confirmed,
    #[serde(rename = "배송중")]
    Shipping,
    #[serde(rename = "완료")]
    Done,
}

impl OrderStatus {
    /// Returns the order status that corresponds to a group status.
    pub fn for_group(status: GroupStatus) -> Self {
        match status {
            GroupStatus::Open | GroupStatus::Achieved => OrderStatus::Submitted,
            GroupStatus::Confirmed => OrderStatus::Confirmed,
            GroupStatus::Shipping => OrderStatus::Shipping,
            GroupStatus::Done => OrderStatus::Done,
        }
    }

    /// Returns the Korean label.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "주문완료",
            OrderStatus::Confirmed => "확정",
            OrderStatus::Shipping => "배송중",
            OrderStatus::Done => "완료",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_derives_status_and_sub_stage() {
        assert_eq!(GroupStage::Open.status(), GroupStatus::Open);
        assert_eq!(GroupStage::Open.delivery_stage(), None);

        let shipping = GroupStage::Delivery(DeliveryStage::Preparing);
        assert_eq!(shipping.status(), GroupStatus::Shipping);
        assert_eq!(shipping.delivery_stage(), Some(DeliveryStage::Preparing));

        let done = GroupStage::Delivery(DeliveryStage::Delivered);
        assert_eq!(done.status(), GroupStatus::Done);
    }

    #[test]
    fn only_delivered_maps_to_done() {
        let done: Vec<_> = DeliveryStage::ALL
            .iter()
            .filter(|s| s.status() == GroupStatus::Done)
            .collect();
        assert_eq!(done, vec![&DeliveryStage::Delivered]);
    }

    #[test]
    fn delivery_stages_are_ordered() {
        assert!(DeliveryStage::PaymentNotice < DeliveryStage::ShippingEntered);
        assert!(DeliveryStage::ShippingEntered < DeliveryStage::Delivered);
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(OrderStatus::for_group(GroupStatus::Open), OrderStatus::Submitted);
        assert_eq!(OrderStatus::for_group(GroupStatus::Achieved), OrderStatus::Submitted);
        assert_eq!(OrderStatus::for_group(GroupStatus::Confirmed), OrderStatus::Confirmed);
        assert_eq!(OrderStatus::for_group(GroupStatus::Shipping), OrderStatus::Shipping);
        assert_eq!(OrderStatus::for_group(GroupStatus::Done), OrderStatus::Done);
    }

    #[test]
    fn statuses_serialize_as_korean_labels() {
        assert_eq!(serde_json::to_string(&GroupStatus::Achieved).unwrap(), "\"달성\"");
        assert_eq!(serde_json::to_string(&OrderStatus::Submitted).unwrap(), "\"주문완료\"");
        assert_eq!(
            serde_json::from_str::<DeliveryStage>("\"배송완료\"").unwrap(),
            DeliveryStage::Delivered
        );
    }

    #[test]
    fn only_collecting_stages_accept_order_changes() {
        assert!(GroupStage::Open.accepts_order_changes());
        assert!(GroupStage::Achieved.accepts_order_changes());
        assert!(!GroupStage::Confirmed.accepts_order_changes());
        assert!(!GroupStage::Delivery(DeliveryStage::PaymentNotice).accepts_order_changes());
    }
}
