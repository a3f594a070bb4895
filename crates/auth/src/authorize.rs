use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role {role} lacks permission '{permission}'")]
    Forbidden { role: Role, permission: Permission },

    #[error("forbidden: {0} principal is missing its owning admin")]
    MissingAdmin(Role),
}

/// Role-level gate (no IO, no panics, no business logic).
///
/// Passing this check does not grant access to any particular product; the
/// access scoper decides that.
pub fn authorize(principal: &Principal, required: Permission) -> Result<(), AuthzError> {
    if !Permission::granted_to(principal.role).contains(&required) {
        return Err(AuthzError::Forbidden {
            role: principal.role,
            permission: required,
        });
    }
    if principal.role == Role::Staff && principal.admin_id.is_none() {
        return Err(AuthzError::MissingAdmin(principal.role));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use invledger_core::{AdminId, StaffId, UserId};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn staff_may_mutate_but_not_manage_catalog() {
        let p = Principal::staff(StaffId::new(), AdminId::new());
        assert!(authorize(&p, Permission::MutateStock).is_ok());
        assert_eq!(
            authorize(&p, Permission::ManageCatalog),
            Err(AuthzError::Forbidden {
                role: Role::Staff,
                permission: Permission::ManageCatalog
            })
        );
    }

    #[test]
    fn users_cannot_read_the_ledger() {
        let p = Principal::user(UserId::new());
        assert!(authorize(&p, Permission::ReadLedger).is_err());
    }

    #[test]
    fn staff_without_admin_is_rejected() {
        let p = Principal {
            principal_id: Uuid::now_v7(),
            role: Role::Staff,
            admin_id: None,
        };
        assert_eq!(
            authorize(&p, Permission::ReadLedger),
            Err(AuthzError::MissingAdmin(Role::Staff))
        );
    }
}
