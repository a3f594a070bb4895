use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use invledger_auth::StaffScope;
use invledger_core::{AdminId, CategoryId, DomainError, DomainResult, Entity, StaffId};

/// Category owned by exactly one admin. Products inherit their tenant from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub admin_id: AdminId,
}

impl Category {
    pub fn new(name: impl Into<String>, admin_id: AdminId) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }
        Ok(Self {
            id: CategoryId::new(),
            name,
            admin_id,
        })
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Staff member working for one admin, assigned to a set of categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub admin_id: AdminId,
    pub name: String,
    pub categories: BTreeSet<CategoryId>,
}

impl StaffMember {
    pub fn new(name: impl Into<String>, admin_id: AdminId) -> Self {
        Self {
            id: StaffId::new(),
            admin_id,
            name: name.into(),
            categories: BTreeSet::new(),
        }
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn scope(&self) -> StaffScope<'_> {
        StaffScope {
            staff_id: self.id,
            admin_id: self.admin_id,
            categories: &self.categories,
        }
    }
}

impl Entity for StaffMember {
    type Id = StaffId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
