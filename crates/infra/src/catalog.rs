//! Admin-side catalog actions: categories, staff, products and assignments.
//!
//! Stock levels never change here except through the opening entry written at
//! creation; everything else goes through the `StockMutator`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use invledger_auth::{Permission, Principal, Role, authorize};
use invledger_core::{
    AdminId, AggregateRoot, CategoryId, Clock, DomainError, ExpectedVersion, ProductId, StaffId,
};
use invledger_inventory::{
    Category, InventoryLogEntry, NewLogEntry, NewProduct, Product, StaffMember,
};

use crate::error::LedgerError;
use crate::ledger_store::{LedgerStore, StoreError};
use crate::mutator::{MutationOutcome, StockMutator};
use crate::scoping::AccessScoper;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub category_id: CategoryId,
    pub initial_stock: i64,
    /// Defaults to `DEFAULT_THRESHOLD`.
    pub threshold: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
    pub product: Product,
    /// Opening ADD entry; `None` when the product starts empty.
    pub opening: Option<InventoryLogEntry>,
}

#[derive(Debug, Clone)]
pub struct ProductCatalog<S> {
    store: S,
    scoper: AccessScoper<S>,
    mutator: StockMutator<S>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

/// Catalog writes are admin-only.
fn admin_of(principal: &Principal) -> Result<AdminId, LedgerError> {
    authorize(principal, Permission::ManageCatalog)?;
    match principal.role {
        Role::Admin => Ok(AdminId::from_uuid(principal.principal_id)),
        _ => Err(LedgerError::Forbidden),
    }
}

impl<S> ProductCatalog<S>
where
    S: LedgerStore + Clone,
{
    pub fn new(
        store: S,
        scoper: AccessScoper<S>,
        mutator: StockMutator<S>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            scoper,
            mutator,
            clock,
            max_retries,
        }
    }

    pub async fn register_category(
        &self,
        principal: &Principal,
        name: &str,
    ) -> Result<Category, LedgerError> {
        let admin = admin_of(principal)?;
        let category = Category::new(name, admin)?;
        self.store.upsert_category(&category).await?;
        Ok(category)
    }

    /// Register a staff member under the calling admin, optionally scoped to
    /// some of that admin's categories.
    pub async fn register_staff(
        &self,
        principal: &Principal,
        name: &str,
        categories: impl IntoIterator<Item = CategoryId>,
    ) -> Result<StaffMember, LedgerError> {
        let admin = admin_of(principal)?;
        let mut staff = StaffMember::new(name, admin);
        for category_id in categories.into_iter().collect::<BTreeSet<_>>() {
            self.owned_category(admin, category_id).await?;
            staff = staff.with_category(category_id);
        }
        self.store.upsert_staff(&staff).await?;
        Ok(staff)
    }

    async fn owned_category(
        &self,
        admin: AdminId,
        category_id: CategoryId,
    ) -> Result<Category, LedgerError> {
        let category = self
            .store
            .get_category(category_id)
            .await?
            .ok_or(LedgerError::NotFound("category"))?;
        if category.admin_id != admin {
            return Err(LedgerError::Forbidden);
        }
        Ok(category)
    }

    /// Create a product; a positive opening stock is recorded as an ADD entry
    /// so the ledger replays to the stored level from the start.
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn create_product(
        &self,
        principal: &Principal,
        request: CreateProduct,
    ) -> Result<CreatedProduct, LedgerError> {
        let admin = admin_of(principal)?;
        self.owned_category(admin, request.category_id).await?;

        let (product, opening) = Product::create(NewProduct {
            name: request.name,
            category_id: request.category_id,
            admin_id: admin,
            initial_stock: request.initial_stock,
            threshold: request.threshold,
            occurred_at: self.clock.now(),
        })?;
        let opening = self
            .store
            .insert_product(&product, opening.as_ref().map(NewLogEntry::from_adjustment))
            .await?;

        info!(
            product_id = %product.id_typed(),
            category_id = %product.category_id(),
            initial_stock = product.number_of_stocks(),
            threshold = product.threshold(),
            "product created"
        );
        Ok(CreatedProduct { product, opening })
    }

    /// New threshold; status is recomputed and a GOOD to CRITICAL flip notifies.
    pub async fn update_threshold(
        &self,
        principal: &Principal,
        product_id: ProductId,
        threshold: i64,
    ) -> Result<MutationOutcome, LedgerError> {
        admin_of(principal)?;
        self.mutator
            .change_threshold(principal, product_id, threshold)
            .await
    }

    pub async fn assign_staff(
        &self,
        principal: &Principal,
        product_id: ProductId,
        staff_id: StaffId,
    ) -> Result<Product, LedgerError> {
        self.change_assignment(principal, product_id, staff_id, Product::assign)
            .await
    }

    pub async fn unassign_staff(
        &self,
        principal: &Principal,
        product_id: ProductId,
        staff_id: StaffId,
    ) -> Result<Product, LedgerError> {
        self.change_assignment(principal, product_id, staff_id, Product::unassign)
            .await
    }

    #[instrument(skip(self, principal, change), fields(principal = %principal.principal_id), err)]
    async fn change_assignment(
        &self,
        principal: &Principal,
        product_id: ProductId,
        staff_id: StaffId,
        change: fn(&mut Product, StaffId) -> bool,
    ) -> Result<Product, LedgerError> {
        let admin = admin_of(principal)?;
        let staff = self
            .store
            .get_staff(staff_id)
            .await?
            .ok_or(LedgerError::NotFound("staff"))?;
        if staff.admin_id != admin {
            return Err(LedgerError::Forbidden);
        }

        let mut attempt = 0;
        loop {
            let mut product = self
                .scoper
                .ensure_access(principal, product_id, Permission::ManageCatalog)
                .await?;
            let expected = ExpectedVersion::Exact(product.version());
            if !change(&mut product, staff_id) {
                return Ok(product);
            }
            match self.store.commit_mutation(&product, expected, None).await {
                Ok(_) => return Ok(product),
                Err(StoreError::Concurrency(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(product_id = %product_id, attempt, reason = %msg, "stale product version; retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a product that never recorded a movement.
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn delete_product(
        &self,
        principal: &Principal,
        product_id: ProductId,
    ) -> Result<(), LedgerError> {
        admin_of(principal)?;
        self.scoper
            .ensure_access(principal, product_id, Permission::ManageCatalog)
            .await?;

        let entries = self.store.count_entries(product_id).await?;
        if entries > 0 {
            return Err(DomainError::conflict(format!(
                "product {product_id} has {entries} ledger entries and cannot be deleted"
            ))
            .into());
        }
        self.store.delete_product(product_id).await?;
        info!(product_id = %product_id, "product deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use invledger_auth::StaffScopeMode;
    use invledger_core::{ErrorKind, SystemClock};
    use invledger_events::NoopNotificationSink;
    use invledger_inventory::{ActionType, DEFAULT_THRESHOLD, StockStatus};

    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;

    fn catalog(store: Arc<InMemoryLedgerStore>) -> ProductCatalog<Arc<InMemoryLedgerStore>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let scoper = AccessScoper::new(store.clone(), StaffScopeMode::ProductAssignment);
        let mutator = StockMutator::new(
            store.clone(),
            scoper.clone(),
            Arc::new(NoopNotificationSink),
            clock.clone(),
            3,
        );
        ProductCatalog::new(store, scoper, mutator, clock, 3)
    }

    #[tokio::test]
    async fn create_product_writes_opening_entry_with_default_threshold() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = catalog(store.clone());
        let admin = Principal::admin(AdminId::new());
        let category = catalog.register_category(&admin, "Garden").await.unwrap();

        let created = catalog
            .create_product(
                &admin,
                CreateProduct {
                    name: "Hose".to_string(),
                    category_id: category.id,
                    initial_stock: 4,
                    threshold: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.product.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(created.product.status(), StockStatus::Critical);
        let opening = created.opening.unwrap();
        assert_eq!(opening.action, ActionType::Add);
        assert_eq!(opening.quantity, 4);
    }

    #[tokio::test]
    async fn foreign_category_and_non_admins_are_refused() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = catalog(store.clone());
        let owner = Principal::admin(AdminId::new());
        let category = catalog.register_category(&owner, "Garden").await.unwrap();
        let request = CreateProduct {
            name: "Rake".to_string(),
            category_id: category.id,
            initial_stock: 0,
            threshold: Some(2),
        };

        let other = Principal::admin(AdminId::new());
        let err = catalog.create_product(&other, request.clone()).await.unwrap_err();
        assert_eq!(err, LedgerError::Forbidden);

        let staff = catalog.register_staff(&owner, "Ann", []).await.unwrap();
        let as_staff = Principal::staff(staff.id, staff.admin_id);
        let err = catalog.create_product(&as_staff, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn delete_is_blocked_by_history() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = catalog(store.clone());
        let admin = Principal::admin(AdminId::new());
        let category = catalog.register_category(&admin, "Garden").await.unwrap();
        let create = |stock| CreateProduct {
            name: "Pot".to_string(),
            category_id: category.id,
            initial_stock: stock,
            threshold: None,
        };

        let stocked = catalog.create_product(&admin, create(3)).await.unwrap();
        let err = catalog
            .delete_product(&admin, stocked.product.id_typed())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let empty = catalog.create_product(&admin, create(0)).await.unwrap();
        catalog
            .delete_product(&admin, empty.product.id_typed())
            .await
            .unwrap();
        assert!(store.get_product(empty.product.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn assignment_requires_staff_of_the_same_admin() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = catalog(store.clone());
        let admin = Principal::admin(AdminId::new());
        let category = catalog.register_category(&admin, "Garden").await.unwrap();
        let product = catalog
            .create_product(
                &admin,
                CreateProduct {
                    name: "Shovel".to_string(),
                    category_id: category.id,
                    initial_stock: 1,
                    threshold: None,
                },
            )
            .await
            .unwrap()
            .product;

        let own = catalog.register_staff(&admin, "Bo", []).await.unwrap();
        let updated = catalog
            .assign_staff(&admin, product.id_typed(), own.id)
            .await
            .unwrap();
        assert!(updated.assignees().contains(&own.id));

        let other_admin = Principal::admin(AdminId::new());
        let foreign = catalog.register_staff(&other_admin, "Cy", []).await.unwrap();
        let err = catalog
            .assign_staff(&admin, product.id_typed(), foreign.id)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Forbidden);

        let cleared = catalog
            .unassign_staff(&admin, product.id_typed(), own.id)
            .await
            .unwrap();
        assert!(cleared.assignees().is_empty());
    }
}
