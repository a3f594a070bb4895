use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invledger_core::{AdminId, StaffId, UserId};

use crate::Role;

/// Identity context resolved by the authentication layer and passed into every
/// ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: Uuid,
    pub role: Role,
    /// Owning admin for staff principals; the admin's own id for admins.
    pub admin_id: Option<AdminId>,
}

impl Principal {
    pub fn admin(id: AdminId) -> Self {
        Self {
            principal_id: *id.as_uuid(),
            role: Role::Admin,
            admin_id: Some(id),
        }
    }

    pub fn staff(id: StaffId, admin_id: AdminId) -> Self {
        Self {
            principal_id: *id.as_uuid(),
            role: Role::Staff,
            admin_id: Some(admin_id),
        }
    }

    pub fn user(id: UserId) -> Self {
        Self {
            principal_id: *id.as_uuid(),
            role: Role::User,
            admin_id: None,
        }
    }

    /// The ledger author this principal writes as, if its role may write at all.
    pub fn actor(&self) -> Option<Actor> {
        match self.role {
            Role::Admin => Some(Actor::Admin(AdminId::from_uuid(self.principal_id))),
            Role::Staff => Some(Actor::Staff(StaffId::from_uuid(self.principal_id))),
            Role::User => None,
        }
    }
}

/// Author of a ledger entry.
///
/// Exactly one of admin/staff authored each entry, so this is a tagged union
/// rather than two nullable columns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Admin(AdminId),
    Staff(StaffId),
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Actor::Admin(_) => Role::Admin,
            Actor::Staff(_) => Role::Staff,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Actor::Admin(id) => *id.as_uuid(),
            Actor::Staff(id) => *id.as_uuid(),
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_principal_has_no_actor() {
        assert_eq!(Principal::user(UserId::new()).actor(), None);

        let staff = StaffId::new();
        let p = Principal::staff(staff, AdminId::new());
        assert_eq!(p.actor(), Some(Actor::Staff(staff)));
    }

    #[test]
    fn actor_serializes_as_tagged_union() {
        let admin = AdminId::new();
        let json = serde_json::to_value(Actor::Admin(admin)).unwrap();
        assert_eq!(json["role"], "ADMIN");
        assert_eq!(json["id"], admin.to_string());
    }
}
