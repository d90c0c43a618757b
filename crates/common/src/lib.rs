//! Identifier and version types shared by every crate in the workspace.

mod ids;
mod version;

pub use ids::{GroupId, OrderId, TransactionId, UserId};
pub use version::Version;
