//! Authorization gate.
//!
//! Every mutating operation calls [`authorize`] before touching state. The
//! decision depends only on the action, the actor's role, and who owns the
//! resource, and a refusal is always [`DomainError::Forbidden`].

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Role supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Organizer,
    Admin,
}

impl Role {
    /// Parses a role name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "buyer" | "user" => Some(Role::Buyer),
            "organizer" | "leader" => Some(Role::Organizer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    /// Creates a new actor.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// Returns true if the actor is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Capabilities checked by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateGroup,
    PlaceOrder,
    ModifyOwnOrder,
    CancelOrderPrivileged,
    ConfirmGroup,
    CancelConfirmation,
    AdvanceDelivery,
    EditGroup,
    DeleteGroup,
    ManageSettings,
    ViewAuditLog,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::CreateGroup => "create a group",
            Action::PlaceOrder => "place this order",
            Action::ModifyOwnOrder => "modify this order",
            Action::CancelOrderPrivileged => "cancel orders in this group",
            Action::ConfirmGroup => "confirm this group",
            Action::CancelConfirmation => "cancel the confirmation of this group",
            Action::AdvanceDelivery => "change delivery progress",
            Action::EditGroup => "edit this group",
            Action::DeleteGroup => "delete this group",
            Action::ManageSettings => "change commission settings",
            Action::ViewAuditLog => "read the audit log",
        }
    }
}

/// Who owns the resource an action targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resource<'a> {
    /// The user an order belongs to.
    pub owner: Option<&'a UserId>,
    /// The organizer of the group involved.
    pub organizer: Option<&'a UserId>,
}

impl<'a> Resource<'a> {
    /// A resource with no ownership.
    pub fn none() -> Self {
        Self::default()
    }

    /// A resource owned by a single user.
    pub fn owned_by(owner: &'a UserId) -> Self {
        Self {
            owner: Some(owner),
            organizer: None,
        }
    }

    /// A group organized by `organizer`.
    pub fn group(organizer: &'a UserId) -> Self {
        Self {
            owner: None,
            organizer: Some(organizer),
        }
    }
}

/// Checks whether `actor` may perform `action` on `resource`.
pub fn authorize(actor: &Actor, action: Action, resource: Resource<'_>) -> Result<(), DomainError> {
    let is_owner = resource.owner == Some(&actor.id);
    let is_organizer = resource.organizer == Some(&actor.id);

    let allowed = match action {
        Action::CreateGroup => matches!(actor.role, Role::Organizer | Role::Admin),
        Action::PlaceOrder => is_owner || actor.is_admin(),
        Action::ModifyOwnOrder => is_owner,
        Action::CancelOrderPrivileged
        | Action::ConfirmGroup
        | Action::CancelConfirmation
        | Action::EditGroup
        | Action::DeleteGroup => is_organizer || actor.is_admin(),
        Action::AdvanceDelivery | Action::ManageSettings | Action::ViewAuditLog => {
            actor.is_admin()
        }
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(actor = %actor.id, ?action, "authorization refused");
        metrics::counter!("authorization_refusals_total").increment(1);
        Err(DomainError::Forbidden {
            actor: actor.id.to_string(),
            action: action.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buyer(id: &str) -> Actor {
        Actor::new(id, id, Role::Buyer)
    }

    fn organizer(id: &str) -> Actor {
        Actor::new(id, id, Role::Organizer)
    }

    fn admin() -> Actor {
        Actor::new("admin", "Admin", Role::Admin)
    }

    #[test]
    fn only_organizers_and_admins_create_groups() {
        assert!(authorize(&buyer("u1"), Action::CreateGroup, Resource::none()).is_err());
        assert!(authorize(&organizer("o1"), Action::CreateGroup, Resource::none()).is_ok());
        assert!(authorize(&admin(), Action::CreateGroup, Resource::none()).is_ok());
    }

    #[test]
    fn own_order_changes_are_owner_only() {
        let owner = UserId::new("u1");
        let resource = Resource::owned_by(&owner);

        assert!(authorize(&buyer("u1"), Action::ModifyOwnOrder, resource).is_ok());
        assert!(authorize(&buyer("u2"), Action::ModifyOwnOrder, resource).is_err());
        assert!(authorize(&admin(), Action::ModifyOwnOrder, resource).is_err());
    }

    #[test]
    fn admins_may_place_orders_for_others() {
        let owner = UserId::new("u1");
        let resource = Resource::owned_by(&owner);

        assert!(authorize(&buyer("u1"), Action::PlaceOrder, resource).is_ok());
        assert!(authorize(&buyer("u2"), Action::PlaceOrder, resource).is_err());
        assert!(authorize(&admin(), Action::PlaceOrder, resource).is_ok());
    }

    #[test]
    fn confirmation_requires_owning_organizer_or_admin() {
        let organizer_id = UserId::new("o1");
        let resource = Resource::group(&organizer_id);

        assert!(authorize(&organizer("o1"), Action::ConfirmGroup, resource).is_ok());
        assert!(authorize(&organizer("o2"), Action::ConfirmGroup, resource).is_err());
        assert!(authorize(&admin(), Action::CancelConfirmation, resource).is_ok());
    }

    #[test]
    fn delivery_is_admin_only() {
        let organizer_id = UserId::new("o1");
        let resource = Resource::group(&organizer_id);

        assert!(authorize(&organizer("o1"), Action::AdvanceDelivery, resource).is_err());
        assert!(authorize(&admin(), Action::AdvanceDelivery, resource).is_ok());
    }

    #[test]
    fn audit_log_is_admin_only() {
        assert!(authorize(&organizer("o1"), Action::ViewAuditLog, Resource::none()).is_err());
        assert!(authorize(&admin(), Action::ViewAuditLog, Resource::none()).is_ok());
    }

    #[test]
    fn refusal_is_forbidden() {
        let err = authorize(&buyer("u1"), Action::ManageSettings, Resource::none()).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { .. }));
    }

    #[test]
    fn role_parse() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("leader"), Some(Role::Organizer));
        assert_eq!(Role::parse("guest"), None);
    }
}
