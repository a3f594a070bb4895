use serde::{Deserialize, Serialize};

use crate::Role;

/// Coarse capability checked before any scoping decision.
///
/// Role gates come first (cheap, no store access); the per-product scoper runs
/// afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read products, ledger entries and analytics.
    ReadLedger,
    /// Increase/decrease/set stock levels.
    MutateStock,
    /// Create/delete products, change thresholds, assign staff.
    ManageCatalog,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadLedger => "inventory.read",
            Permission::MutateStock => "inventory.mutate",
            Permission::ManageCatalog => "catalog.manage",
        }
    }

    /// Static role → permission mapping.
    pub fn granted_to(role: Role) -> &'static [Permission] {
        match role {
            Role::Admin => &[
                Permission::ReadLedger,
                Permission::MutateStock,
                Permission::ManageCatalog,
            ],
            Role::Staff => &[Permission::ReadLedger, Permission::MutateStock],
            Role::User => &[],
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
