//! Domain layer for the group-buying engine.
//!
//! This crate provides:
//! - The authorization gate every mutation passes through
//! - The group aggregate and its lifecycle state machine
//! - Order line mutations with per-user minimum enforcement
//! - Commission resolution and settlement
//! - Visit telemetry
//! - Store and notification ports with in-memory implementations

pub mod auth;
pub mod commission;
pub mod error;
pub mod group;
pub mod notify;
pub mod order;
pub mod service;
pub mod store;
pub mod value_objects;
pub mod visit;

pub use auth::{Action, Actor, Resource, Role, authorize};
pub use commission::{
    AdminSettings, CommissionRate, CommissionService, RateSource, ResolvedRate, Settlement,
};
pub use error::DomainError;
pub use group::{
    DeliveryStage, Group, GroupDetailsUpdate, GroupStage, GroupStatus, NewGroup, OrderStatus,
    StageChange,
};
pub use notify::{InMemoryNotifier, StatusNotification, StatusNotifier, TracingNotifier};
pub use order::{NewOrderLine, OrderLine, OrderTransaction};
pub use service::{CancelScope, GroupBuyService};
pub use store::{
    GroupCommit, InMemoryMarketStore, MarketStore, MarketStoreExt, SettingsStore, StoreError,
    VisitStore,
};
pub use value_objects::{
    DeliveryInfo, GROUP_MINIMUM_TOTAL, MenuItem, Money, ProductId, USER_MINIMUM_TOTAL,
};
pub use visit::{UserGroupVisit, VisitTracker};
