//! Access Scoper service: loads scope relations from the store and applies the
//! pure `AccessPolicy` predicate.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use invledger_auth::{
    AccessDecision, AccessPolicy, Permission, Principal, Role, StaffScopeMode, authorize,
};
use invledger_core::{AdminId, ProductId, StaffId};
use invledger_inventory::{Product, ProductFilter, StaffMember};

use crate::error::LedgerError;
use crate::ledger_store::{LedgerStore, StoreError};

#[derive(Debug, Clone)]
pub struct AccessScoper<S> {
    store: S,
    policy: AccessPolicy,
}

impl<S> AccessScoper<S> {
    pub fn new(store: S, mode: StaffScopeMode) -> Self {
        Self {
            store,
            policy: AccessPolicy::new(mode),
        }
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }
}

impl<S> AccessScoper<S>
where
    S: LedgerStore,
{
    async fn staff_record(&self, principal: &Principal) -> Result<Option<StaffMember>, StoreError> {
        if principal.role != Role::Staff {
            return Ok(None);
        }
        self.store
            .get_staff(StaffId::from_uuid(principal.principal_id))
            .await
    }

    async fn decide(
        &self,
        principal: &Principal,
        product: &Product,
    ) -> Result<AccessDecision, StoreError> {
        let staff = self.staff_record(principal).await?;
        Ok(self
            .policy
            .decide(principal, &product.scope(), staff.as_ref().map(|s| s.scope()).as_ref()))
    }

    /// `true` iff the principal may read/mutate `product`. Store failures deny.
    pub async fn can_access(&self, principal: &Principal, product: &Product) -> bool {
        match self.decide(principal, product).await {
            Ok(decision) => decision.is_granted(),
            Err(e) => {
                warn!(error = %e, product_id = %product.id_typed(), "scope lookup failed; denying");
                false
            }
        }
    }

    /// Every product the principal may see, failing on store errors.
    pub async fn try_visible_product_ids(
        &self,
        principal: &Principal,
    ) -> Result<BTreeSet<ProductId>, StoreError> {
        let (owner, staff) = match principal.role {
            Role::Admin => (AdminId::from_uuid(principal.principal_id), None),
            Role::Staff => match self.staff_record(principal).await? {
                Some(staff) => (staff.admin_id, Some(staff)),
                None => return Ok(BTreeSet::new()),
            },
            Role::User => return Ok(BTreeSet::new()),
        };

        let candidates = self.store.list_products(&ProductFilter::owned_by(owner)).await?;
        let staff_scope = staff.as_ref().map(|s| s.scope());
        Ok(candidates
            .iter()
            .filter(|p| {
                self.policy
                    .can_access(principal, &p.scope(), staff_scope.as_ref())
            })
            .map(Product::id_typed)
            .collect())
    }

    /// Every product the principal may see. Store failures yield the empty set.
    pub async fn visible_product_ids(&self, principal: &Principal) -> BTreeSet<ProductId> {
        match self.try_visible_product_ids(principal).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, principal = %principal.principal_id, "visibility lookup failed");
                BTreeSet::new()
            }
        }
    }

    /// Role gate, fresh product read, then the scope check.
    ///
    /// Returns the product as read; callers mutating it must still commit with
    /// the version they got here.
    pub async fn ensure_access(
        &self,
        principal: &Principal,
        product_id: ProductId,
        permission: Permission,
    ) -> Result<Product, LedgerError> {
        authorize(principal, permission)?;
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(LedgerError::NotFound("product"))?;

        match self.decide(principal, &product).await? {
            AccessDecision::Granted => Ok(product),
            AccessDecision::Denied(reason) => {
                debug!(
                    product_id = %product_id,
                    principal = %principal.principal_id,
                    ?reason,
                    "access denied"
                );
                Err(LedgerError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use invledger_core::UserId;
    use invledger_inventory::{Category, NewLogEntry, NewProduct};

    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;

    struct World {
        store: Arc<InMemoryLedgerStore>,
        admin: AdminId,
        category: Category,
    }

    async fn world() -> World {
        let store = Arc::new(InMemoryLedgerStore::new());
        let admin = AdminId::new();
        let category = Category::new("Tools", admin).unwrap();
        store.upsert_category(&category).await.unwrap();
        World { store, admin, category }
    }

    async fn product(w: &World, assignee: Option<StaffId>) -> Product {
        let (mut p, opening) = Product::create(NewProduct {
            name: "Saw".to_string(),
            category_id: w.category.id,
            admin_id: w.admin,
            initial_stock: 3,
            threshold: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        if let Some(s) = assignee {
            p.assign(s);
        }
        w.store
            .insert_product(&p, opening.as_ref().map(NewLogEntry::from_adjustment))
            .await
            .unwrap();
        p
    }

    #[tokio::test]
    async fn staff_visibility_follows_assignment() {
        let w = world().await;
        let staff = StaffMember::new("Sam", w.admin);
        w.store.upsert_staff(&staff).await.unwrap();

        let assigned = product(&w, Some(staff.id)).await;
        let _other = product(&w, None).await;

        let scoper = AccessScoper::new(w.store.clone(), StaffScopeMode::ProductAssignment);
        let principal = Principal::staff(staff.id, w.admin);

        let visible = scoper.visible_product_ids(&principal).await;
        assert_eq!(visible, BTreeSet::from([assigned.id_typed()]));
        assert!(scoper.can_access(&principal, &assigned).await);
    }

    #[tokio::test]
    async fn category_mode_uses_staff_categories() {
        let w = world().await;
        let staff = StaffMember::new("Kim", w.admin).with_category(w.category.id);
        w.store.upsert_staff(&staff).await.unwrap();
        let a = product(&w, None).await;
        let b = product(&w, None).await;

        let scoper = AccessScoper::new(w.store.clone(), StaffScopeMode::CategoryAssignment);
        let visible = scoper
            .visible_product_ids(&Principal::staff(staff.id, w.admin))
            .await;
        assert_eq!(visible, BTreeSet::from([a.id_typed(), b.id_typed()]));
    }

    #[tokio::test]
    async fn unknown_staff_and_users_see_nothing() {
        let w = world().await;
        let _p = product(&w, None).await;
        let scoper = AccessScoper::new(w.store.clone(), StaffScopeMode::ProductAssignment);

        assert!(scoper
            .visible_product_ids(&Principal::staff(StaffId::new(), w.admin))
            .await
            .is_empty());
        assert!(scoper
            .visible_product_ids(&Principal::user(UserId::new()))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn ensure_access_maps_to_not_found_then_forbidden() {
        let w = world().await;
        let p = product(&w, None).await;
        let scoper = AccessScoper::new(w.store.clone(), StaffScopeMode::ProductAssignment);

        let missing = scoper
            .ensure_access(&Principal::admin(w.admin), ProductId::new(), Permission::ReadLedger)
            .await;
        assert_eq!(missing.unwrap_err(), LedgerError::NotFound("product"));

        let foreign = scoper
            .ensure_access(&Principal::admin(AdminId::new()), p.id_typed(), Permission::ReadLedger)
            .await;
        assert_eq!(foreign.unwrap_err(), LedgerError::Forbidden);

        let own = scoper
            .ensure_access(&Principal::admin(w.admin), p.id_typed(), Permission::MutateStock)
            .await
            .unwrap();
        assert_eq!(own.id_typed(), p.id_typed());
    }
}
