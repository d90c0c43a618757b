//! Group aggregate and lifecycle state machine.
//!
//! A group collects orders until its funding goal is met, after which the
//! organizer confirms it and an administrator drives delivery:
//!
//! ```text
//! Open ⇄ Achieved ⇄ Confirmed ──► Delivery(PaymentNotice … Delivered)
//! ```
//!
//! `Open ⇄ Achieved` toggles automatically as orders change the running total.

mod aggregate;
mod events;
mod state;

pub use aggregate::{DEFAULT_RECRUITMENT_DAYS, Group, GroupDetailsUpdate, NewGroup};
pub use events::StageChange;
pub use state::{DeliveryStage, GroupStage, GroupStatus, OrderStatus};
