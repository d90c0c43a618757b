use serde::{Deserialize, Serialize};

use super::state::{DeliveryStage, GroupStage, GroupStatus};

/// A committed move of a group from one lifecycle stage to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub from: GroupStage,
    pub to: GroupStage,
}

impl StageChange {
    pub fn new(from: GroupStage, to: GroupStage) -> Self {
        Self { from, to }
    }

    pub fn old_status(&self) -> GroupStatus {
        self.from.status()
    }

    pub fn new_status(&self) -> GroupStatus {
        self.to.status()
    }

    /// Returns true if the coarse status differs, not just the delivery sub-stage.
    pub fn status_changed(&self) -> bool {
        self.old_status() != self.new_status()
    }

    /// Audit payload for one side of the change.
    pub(crate) fn state_json(stage: GroupStage) -> serde_json::Value {
        serde_json::json!({
            "status": stage.status().label(),
            "delivery_stage": stage.delivery_stage().map(|s: DeliveryStage| s.label()),
        })
    }
}
