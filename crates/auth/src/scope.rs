//! Access scoping: which products (and therefore which ledgers) a principal may
//! read or mutate.
//!
//! The predicate is pure. Callers load the scope relations (product → category →
//! admin, staff assignments) and hand them in as borrowed views.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use invledger_core::{AdminId, CategoryId, DomainError, ProductId, StaffId};

use crate::{Principal, Role};

/// How staff visibility is derived.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffScopeMode {
    /// Staff see products that list them as an assignee.
    #[default]
    ProductAssignment,
    /// Staff see every product in the categories they are assigned to.
    CategoryAssignment,
}

impl FromStr for StaffScopeMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" | "product_assignment" => Ok(Self::ProductAssignment),
            "category" | "category_assignment" => Ok(Self::CategoryAssignment),
            other => Err(DomainError::validation(format!(
                "unknown staff scope mode '{other}' (expected 'product' or 'category')"
            ))),
        }
    }
}

/// Scope-relevant view of a product.
#[derive(Debug, Clone, Copy)]
pub struct ProductScope<'a> {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    /// Admin owning the product's category.
    pub owner_admin: AdminId,
    pub assignees: &'a BTreeSet<StaffId>,
}

/// Scope-relevant view of a staff member.
#[derive(Debug, Clone, Copy)]
pub struct StaffScope<'a> {
    pub staff_id: StaffId,
    pub admin_id: AdminId,
    pub categories: &'a BTreeSet<CategoryId>,
}

/// Why access was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The role never touches the ledger (e.g. USER).
    RoleNotPermitted,
    /// The product belongs to another admin's tenant.
    ForeignTenant,
    /// Staff member exists but is not assigned to the product/category.
    NotAssigned,
    /// Staff principal could not be matched to a staff record.
    UnknownStaff,
}

/// Outcome of a scoping check, kept for tracing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

/// Access scoper policy.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    mode: StaffScopeMode,
}

impl AccessPolicy {
    pub fn new(mode: StaffScopeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> StaffScopeMode {
        self.mode
    }

    /// `true` iff the principal may read/mutate the product.
    pub fn can_access(
        &self,
        principal: &Principal,
        product: &ProductScope<'_>,
        staff: Option<&StaffScope<'_>>,
    ) -> bool {
        self.decide(principal, product, staff).is_granted()
    }

    pub fn decide(
        &self,
        principal: &Principal,
        product: &ProductScope<'_>,
        staff: Option<&StaffScope<'_>>,
    ) -> AccessDecision {
        match principal.role {
            Role::Admin => {
                if product.owner_admin.as_uuid() == &principal.principal_id {
                    AccessDecision::Granted
                } else {
                    AccessDecision::Denied(DenialReason::ForeignTenant)
                }
            }
            Role::Staff => {
                let Some(staff) = staff else {
                    return AccessDecision::Denied(DenialReason::UnknownStaff);
                };
                if staff.staff_id.as_uuid() != &principal.principal_id {
                    return AccessDecision::Denied(DenialReason::UnknownStaff);
                }
                if staff.admin_id != product.owner_admin
                    || principal.admin_id.is_some_and(|a| a != staff.admin_id)
                {
                    return AccessDecision::Denied(DenialReason::ForeignTenant);
                }
                let assigned = match self.mode {
                    StaffScopeMode::ProductAssignment => product.assignees.contains(&staff.staff_id),
                    StaffScopeMode::CategoryAssignment => staff.categories.contains(&product.category_id),
                };
                if assigned {
                    AccessDecision::Granted
                } else {
                    AccessDecision::Denied(DenialReason::NotAssigned)
                }
            }
            Role::User => AccessDecision::Denied(DenialReason::RoleNotPermitted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invledger_core::UserId;

    struct Fixture {
        admin: AdminId,
        staff: StaffId,
        category: CategoryId,
        product: ProductId,
        assignees: BTreeSet<StaffId>,
        staff_categories: BTreeSet<CategoryId>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                admin: AdminId::new(),
                staff: StaffId::new(),
                category: CategoryId::new(),
                product: ProductId::new(),
                assignees: BTreeSet::new(),
                staff_categories: BTreeSet::new(),
            }
        }

        fn product(&self) -> ProductScope<'_> {
            ProductScope {
                product_id: self.product,
                category_id: self.category,
                owner_admin: self.admin,
                assignees: &self.assignees,
            }
        }

        fn staff(&self) -> StaffScope<'_> {
            StaffScope {
                staff_id: self.staff,
                admin_id: self.admin,
                categories: &self.staff_categories,
            }
        }
    }

    #[test]
    fn admin_sees_only_own_tenant() {
        let f = Fixture::new();
        let policy = AccessPolicy::default();
        assert!(policy.can_access(&Principal::admin(f.admin), &f.product(), None));
        assert_eq!(
            policy.decide(&Principal::admin(AdminId::new()), &f.product(), None),
            AccessDecision::Denied(DenialReason::ForeignTenant)
        );
    }

    #[test]
    fn staff_needs_product_assignment_in_product_mode() {
        let mut f = Fixture::new();
        let policy = AccessPolicy::new(StaffScopeMode::ProductAssignment);
        let principal = Principal::staff(f.staff, f.admin);

        assert_eq!(
            policy.decide(&principal, &f.product(), Some(&f.staff())),
            AccessDecision::Denied(DenialReason::NotAssigned)
        );

        f.assignees.insert(f.staff);
        assert!(policy.can_access(&principal, &f.product(), Some(&f.staff())));
    }

    #[test]
    fn staff_needs_category_assignment_in_category_mode() {
        let mut f = Fixture::new();
        let policy = AccessPolicy::new(StaffScopeMode::CategoryAssignment);
        let principal = Principal::staff(f.staff, f.admin);

        // Product-level assignment does not count in category mode.
        f.assignees.insert(f.staff);
        assert!(!policy.can_access(&principal, &f.product(), Some(&f.staff())));

        f.staff_categories.insert(f.category);
        assert!(policy.can_access(&principal, &f.product(), Some(&f.staff())));
    }

    #[test]
    fn staff_of_another_admin_is_denied_even_if_assigned() {
        let mut f = Fixture::new();
        f.assignees.insert(f.staff);
        let other_admin = AdminId::new();
        let staff_view = StaffScope {
            staff_id: f.staff,
            admin_id: other_admin,
            categories: &f.staff_categories,
        };
        let principal = Principal::staff(f.staff, other_admin);
        assert_eq!(
            AccessPolicy::default().decide(&principal, &f.product(), Some(&staff_view)),
            AccessDecision::Denied(DenialReason::ForeignTenant)
        );
    }

    #[test]
    fn users_are_always_denied() {
        let f = Fixture::new();
        assert_eq!(
            AccessPolicy::default().decide(&Principal::user(UserId::new()), &f.product(), None),
            AccessDecision::Denied(DenialReason::RoleNotPermitted)
        );
    }

    #[test]
    fn mode_parses_from_config_strings() {
        assert_eq!("category".parse::<StaffScopeMode>().unwrap(), StaffScopeMode::CategoryAssignment);
        assert_eq!("Product".parse::<StaffScopeMode>().unwrap(), StaffScopeMode::ProductAssignment);
        assert!("team".parse::<StaffScopeMode>().is_err());
    }
}
