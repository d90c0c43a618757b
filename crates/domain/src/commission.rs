//! Commission rates and settlement.
//!
//! An organizer's effective rate is their override if one exists, otherwise the
//! default from the admin settings. Rates are resolved each time a settlement
//! is computed, so changing a rate also changes the settlement of groups that
//! already completed.

use common::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::{Action, Actor, Resource, authorize};
use crate::error::DomainError;
use crate::group::GroupStatus;
use crate::store::{MarketStore, MarketStoreExt, SettingsStore};
use crate::value_objects::Money;

const BASIS_POINTS_PER_UNIT: i64 = 10_000;

/// A commission rate in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u16);

impl CommissionRate {
    /// Rate used when no default has ever been configured.
    pub const DEFAULT: CommissionRate = CommissionRate(1_000);

    /// Creates a rate from a percentage in `0.0..=100.0`.
    pub fn from_percent(percent: f64) -> Result<Self, DomainError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(DomainError::Validation(format!(
                "commission rate must be between 0 and 100 percent, got {percent}"
            )));
        }
        // Bounded to 0..=10_000 by the check above.
        Ok(Self((percent * 100.0).round() as u16))
    }

    /// Creates a rate from basis points in `0..=10_000`.
    pub fn from_basis_points(basis_points: u16) -> Result<Self, DomainError> {
        if i64::from(basis_points) > BASIS_POINTS_PER_UNIT {
            return Err(DomainError::Validation(format!(
                "commission rate must be at most 10000 basis points, got {basis_points}"
            )));
        }
        Ok(Self(basis_points))
    }

    pub fn basis_points(&self) -> u16 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Commission owed on `total`, rounded down to whole won.
    pub fn apply(&self, total: Money) -> Money {
        let owed = i128::from(total.amount()) * i128::from(self.0)
            / i128::from(BASIS_POINTS_PER_UNIT);
        // |owed| <= |total| since the rate is at most one.
        Money::won(owed as i64)
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.as_percent())
    }
}

/// The admin settings singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSettings {
    pub default_commission_rate: CommissionRate,
    /// Whether new organizers are being recruited.
    pub recruitment_open: bool,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            default_commission_rate: CommissionRate::DEFAULT,
            recruitment_open: true,
        }
    }
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Override,
    Default,
}

/// A rate together with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate: CommissionRate,
    pub source: RateSource,
}

/// Settlement of a completed group. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub group_id: GroupId,
    pub organizer_id: UserId,
    pub order_total: Money,
    pub rate: CommissionRate,
    pub rate_source: RateSource,
    pub commission: Money,
}

/// Resolves commission rates and computes settlements.
pub struct CommissionService<S> {
    store: S,
    /// Serializes read-modify-write of the admin settings.
    settings_lock: Mutex<()>,
}

impl<S> CommissionService<S>
where
    S: MarketStore + SettingsStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            settings_lock: Mutex::new(()),
        }
    }

    /// The organizer's override if any, else the configured default.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_rate(&self, organizer_id: &UserId) -> Result<ResolvedRate, DomainError> {
        if let Some(rate) = self.store.organizer_rate(organizer_id).await? {
            return Ok(ResolvedRate {
                rate,
                source: RateSource::Override,
            });
        }
        let settings = self.store.admin_settings().await?;
        Ok(ResolvedRate {
            rate: settings.default_commission_rate,
            source: RateSource::Default,
        })
    }

    /// The organizer's explicit override, if one is set.
    pub async fn organizer_rate(
        &self,
        organizer_id: &UserId,
    ) -> Result<Option<CommissionRate>, DomainError> {
        Ok(self.store.organizer_rate(organizer_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_organizer_rate(
        &self,
        actor: &Actor,
        organizer_id: UserId,
        rate: CommissionRate,
    ) -> Result<(), DomainError> {
        authorize(actor, Action::ManageSettings, Resource::none())?;
        self.store.set_organizer_rate(organizer_id, rate).await?;
        tracing::info!(%rate, "organizer commission override set");
        Ok(())
    }

    /// Removes an override. Returns false if none existed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_organizer_rate(
        &self,
        actor: &Actor,
        organizer_id: &UserId,
    ) -> Result<bool, DomainError> {
        authorize(actor, Action::ManageSettings, Resource::none())?;
        Ok(self.store.delete_organizer_rate(organizer_id).await?)
    }

    pub async fn default_rate(&self) -> Result<CommissionRate, DomainError> {
        Ok(self.store.admin_settings().await?.default_commission_rate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_default_rate(
        &self,
        actor: &Actor,
        rate: CommissionRate,
    ) -> Result<(), DomainError> {
        authorize(actor, Action::ManageSettings, Resource::none())?;
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.store.admin_settings().await?;
        settings.default_commission_rate = rate;
        self.store.save_admin_settings(settings).await?;
        tracing::info!(%rate, "default commission rate set");
        Ok(())
    }

    pub async fn recruitment_open(&self) -> Result<bool, DomainError> {
        Ok(self.store.admin_settings().await?.recruitment_open)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_recruitment_open(&self, actor: &Actor, open: bool) -> Result<(), DomainError> {
        authorize(actor, Action::ManageSettings, Resource::none())?;
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.store.admin_settings().await?;
        settings.recruitment_open = open;
        self.store.save_admin_settings(settings).await?;
        tracing::info!(open, "recruitment flag set");
        Ok(())
    }

    /// Computes the settlement of a completed group.
    #[tracing::instrument(skip(self))]
    pub async fn compute_settlement(&self, group_id: GroupId) -> Result<Settlement, DomainError> {
        let group = self.store.require_group(group_id).await?;
        if group.status() != GroupStatus::Done {
            return Err(DomainError::invalid_state(
                group.status(),
                "compute the settlement",
            ));
        }

        let orders = self.store.orders_for_group(group_id).await?;
        let order_total = Money::try_sum(orders.iter().map(|o| o.total_price))?;
        let resolved = self.resolve_rate(group.organizer_id()).await?;

        Ok(Settlement {
            group_id,
            organizer_id: group.organizer_id().clone(),
            order_total,
            rate: resolved.rate,
            rate_source: resolved.source,
            commission: resolved.rate.apply(order_total),
        })
    }
}
