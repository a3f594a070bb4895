use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use invledger_core::{AggregateRoot, CategoryId, ExpectedVersion, ProductId, StaffId};
use invledger_inventory::{
    Category, InventoryLogEntry, LogFilter, NewLogEntry, Page, Pagination, Product, ProductFilter,
    StaffMember, StockSnapshot,
};

use super::r#trait::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    categories: HashMap<CategoryId, Category>,
    staff: HashMap<StaffId, StaffMember>,
    /// Per-product ledgers, each kept in replay order.
    ledgers: HashMap<ProductId, Vec<InventoryLogEntry>>,
    snapshots: HashMap<ProductId, Vec<StockSnapshot>>,
    last_sequence: u64,
}

impl State {
    fn append(&mut self, entry: NewLogEntry) -> InventoryLogEntry {
        self.last_sequence += 1;
        let ledger = self.ledgers.entry(entry.product_id).or_default();
        let mut entry = entry;
        if let Some(last) = ledger.last() {
            if entry.created_at < last.created_at {
                entry.created_at = last.created_at;
            }
        }
        let stored = entry.into_entry(self.last_sequence);
        ledger.push(stored.clone());
        stored
    }

    fn matching(&self, filter: &LogFilter) -> Vec<InventoryLogEntry> {
        let mut entries: Vec<InventoryLogEntry> = filter
            .product_ids
            .iter()
            .filter_map(|id| self.ledgers.get(id))
            .flatten()
            .filter(|e| filter.matches_entry(e))
            .cloned()
            .collect();
        filter.sort_entries(&mut entries);
        entries
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every commit runs under one write lock, which gives
/// the same serialization a row lock gives the Postgres store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn check_entry_target(product: &Product, entry: &Option<NewLogEntry>) -> Result<(), StoreError> {
    match entry {
        Some(e) if e.product_id != product.id_typed() => Err(StoreError::Integrity(format!(
            "entry for product {} committed with product {}",
            e.product_id,
            product.id_typed()
        ))),
        _ => Ok(()),
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let state = self.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.created_at(), p.id_typed()));
        Ok(products)
    }

    async fn find_below_threshold(
        &self,
        scope: &BTreeSet<ProductId>,
    ) -> Result<Vec<Product>, StoreError> {
        let filter = ProductFilter {
            ids: Some(scope.clone()),
            below_threshold: true,
            ..ProductFilter::default()
        };
        self.list_products(&filter).await
    }

    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        check_entry_target(product, &opening)?;
        let mut state = self.write()?;
        if state.products.contains_key(&product.id_typed()) {
            return Err(StoreError::Integrity(format!(
                "product {} already exists",
                product.id_typed()
            )));
        }
        if !state.categories.contains_key(&product.category_id()) {
            return Err(StoreError::Integrity(format!(
                "category {} does not exist",
                product.category_id()
            )));
        }
        state.products.insert(product.id_typed(), product.clone());
        Ok(opening.map(|e| state.append(e)))
    }

    async fn commit_mutation(
        &self,
        product: &Product,
        expected: ExpectedVersion,
        entry: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        check_entry_target(product, &entry)?;
        let mut state = self.write()?;
        let current = state
            .products
            .get(&product.id_typed())
            .ok_or(StoreError::NotFound("product"))?
            .version();
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }
        state.products.insert(product.id_typed(), product.clone());
        Ok(entry.map(|e| state.append(e)))
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&id) {
            return Err(StoreError::NotFound("product"));
        }
        if state.ledgers.get(&id).is_some_and(|l| !l.is_empty()) {
            return Err(StoreError::Integrity(format!(
                "product {id} has ledger history"
            )));
        }
        state.products.remove(&id);
        state.snapshots.remove(&id);
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        self.write()?.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.read()?.staff.get(&id).cloned())
    }

    async fn upsert_staff(&self, staff: &StaffMember) -> Result<(), StoreError> {
        self.write()?.staff.insert(staff.id, staff.clone());
        Ok(())
    }

    async fn count_entries(&self, product_id: ProductId) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .ledgers
            .get(&product_id)
            .map_or(0, |l| l.len() as u64))
    }

    async fn load_ledger(
        &self,
        product_id: ProductId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .ledgers
            .get(&product_id)
            .map(|ledger| {
                ledger
                    .iter()
                    .take_while(|e| until.is_none_or(|u| e.created_at <= u))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_ledger_after(
        &self,
        product_id: ProductId,
        after: (DateTime<Utc>, u64),
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .ledgers
            .get(&product_id)
            .map(|ledger| {
                ledger
                    .iter()
                    .skip_while(|e| e.replay_key() <= after)
                    .take_while(|e| until.is_none_or(|u| e.created_at <= u))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn earliest_entry(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        Ok(self
            .read()?
            .ledgers
            .get(&product_id)
            .and_then(|l| l.first().cloned()))
    }

    async fn query_logs(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Page<InventoryLogEntry>, StoreError> {
        let entries = self.read()?.matching(filter);
        Ok(Page::slice(entries, pagination))
    }

    async fn scan_logs(&self, filter: &LogFilter) -> Result<Vec<InventoryLogEntry>, StoreError> {
        Ok(self.read()?.matching(filter))
    }

    async fn latest_snapshot(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError> {
        Ok(self.read()?.snapshots.get(&product_id).and_then(|snaps| {
            snaps
                .iter()
                .filter(|s| s.as_of <= as_of)
                .max_by_key(|s| (s.as_of, s.through_sequence))
                .cloned()
        }))
    }

    async fn store_snapshot(&self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&snapshot.product_id) {
            return Err(StoreError::NotFound("product"));
        }
        let snaps = state.snapshots.entry(snapshot.product_id).or_default();
        snaps.retain(|s| s.through_sequence != snapshot.through_sequence);
        snaps.push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use invledger_auth::Actor;
    use invledger_core::{AdminId, Aggregate, LogEntryId, Quantity};
    use invledger_inventory::{ActionType, AdjustStock, NewProduct, StockCommand};

    use super::*;

    async fn seeded(store: &InMemoryLedgerStore, stock: i64) -> Product {
        let admin = AdminId::new();
        let category = Category::new("Hardware", admin).unwrap();
        store.upsert_category(&category).await.unwrap();
        let (product, opening) = Product::create(NewProduct {
            name: "Hinge".to_string(),
            category_id: category.id,
            admin_id: admin,
            initial_stock: stock,
            threshold: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
        store
            .insert_product(&product, opening.as_ref().map(NewLogEntry::from_adjustment))
            .await
            .unwrap();
        product
    }

    fn removal(product: &Product, qty: i64) -> (Product, NewLogEntry) {
        let cmd = StockCommand::Adjust(AdjustStock {
            actor: Actor::Admin(product.admin_id()),
            action: ActionType::Remove,
            quantity: Quantity::new(qty).unwrap(),
            note: None,
            occurred_at: Utc::now(),
        });
        let events = product.handle(&cmd).unwrap();
        let mut next = product.clone();
        next.apply(&events[0]);
        let entry = NewLogEntry::from_adjustment(events[0].as_adjustment().unwrap());
        (next, entry)
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_writing() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, 10).await;

        let (next, entry) = removal(&product, 2);
        store
            .commit_mutation(&next, ExpectedVersion::Exact(0), Some(entry))
            .await
            .unwrap();

        let (stale, entry) = removal(&product, 3);
        let err = store
            .commit_mutation(&stale, ExpectedVersion::Exact(0), Some(entry))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        let stored = store.get_product(product.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.number_of_stocks(), 8);
        assert_eq!(store.count_entries(product.id_typed()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn created_at_never_goes_backwards_within_a_product() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, 10).await;
        let (next, mut entry) = removal(&product, 1);
        entry.created_at = Utc::now() - Duration::days(3);

        let stored = store
            .commit_mutation(&next, ExpectedVersion::Exact(0), Some(entry))
            .await
            .unwrap()
            .unwrap();

        let ledger = store.load_ledger(product.id_typed(), None).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger[0].replay_key() < ledger[1].replay_key());
        assert_eq!(stored.created_at, ledger[0].created_at);
    }

    #[tokio::test]
    async fn delete_is_refused_once_history_exists() {
        let store = InMemoryLedgerStore::new();
        let with_history = seeded(&store, 5).await;
        let without = seeded(&store, 0).await;

        assert!(matches!(
            store.delete_product(with_history.id_typed()).await,
            Err(StoreError::Integrity(_))
        ));
        store.delete_product(without.id_typed()).await.unwrap();
        assert!(store.get_product(without.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entry_for_another_product_is_an_integrity_error() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, 5).await;
        let (next, mut entry) = removal(&product, 1);
        entry.product_id = ProductId::new();
        entry.id = LogEntryId::new();
        assert!(matches!(
            store.commit_mutation(&next, ExpectedVersion::Any, Some(entry)).await,
            Err(StoreError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn latest_snapshot_respects_as_of() {
        let store = InMemoryLedgerStore::new();
        let product = seeded(&store, 5).await;
        let t0 = Utc::now();
        let early = StockSnapshot {
            product_id: product.id_typed(),
            quantity: 5,
            as_of: t0 - Duration::days(2),
            through_sequence: 1,
            taken_at: t0,
        };
        let late = StockSnapshot {
            as_of: t0,
            through_sequence: 2,
            quantity: 7,
            ..early.clone()
        };
        store.store_snapshot(&early).await.unwrap();
        store.store_snapshot(&late).await.unwrap();

        let found = store
            .latest_snapshot(product.id_typed(), t0 - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(found, Some(early));
    }
}
