use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use invledger_core::{CategoryId, ExpectedVersion, ProductId, StaffId};
use invledger_inventory::{
    Category, InventoryLogEntry, LogFilter, NewLogEntry, Page, Pagination, Product, ProductFilter,
    StaffMember, StockSnapshot,
};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, insufficient stock).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The product changed between the read and the commit.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A relational constraint refused the write (dangling reference, history
    /// blocking a delete, check constraint).
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Repository boundary for products, their scope relations and their ledgers.
///
/// ## Ledger semantics
///
/// - Entries are append-only. No method updates or deletes one.
/// - The store assigns each entry a `sequence`, strictly increasing across the
///   store, and keeps `created_at` non-decreasing per product, so the replay
///   order `(created_at, sequence)` matches commit order.
/// - `commit_mutation` writes the product row and at most one entry atomically,
///   guarded by the product's version.
///
/// Implementations must be safe to share across request tasks.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    /// Products in `scope` whose status is CRITICAL.
    async fn find_below_threshold(
        &self,
        scope: &BTreeSet<ProductId>,
    ) -> Result<Vec<Product>, StoreError>;

    /// Insert a new product together with its opening entry, if any.
    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError>;

    /// Persist `product` (its post-mutation state) and append `entry`.
    ///
    /// Fails with `StoreError::Concurrency` when the stored version does not
    /// match `expected`; nothing is written in that case.
    async fn commit_mutation(
        &self,
        product: &Product,
        expected: ExpectedVersion,
        entry: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError>;

    /// Remove a product with an empty ledger. Fails with `Integrity` otherwise.
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    async fn upsert_category(&self, category: &Category) -> Result<(), StoreError>;

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError>;

    async fn upsert_staff(&self, staff: &StaffMember) -> Result<(), StoreError>;

    async fn count_entries(&self, product_id: ProductId) -> Result<u64, StoreError>;

    /// Entries of one product in replay order, optionally bounded by
    /// `created_at <= until`.
    async fn load_ledger(
        &self,
        product_id: ProductId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError>;

    /// Entries strictly after the replay position `after`, in replay order.
    async fn load_ledger_after(
        &self,
        product_id: ProductId,
        after: (DateTime<Utc>, u64),
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError>;

    async fn earliest_entry(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryLogEntry>, StoreError>;

    /// Filtered, sorted and paginated entries across products.
    async fn query_logs(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Page<InventoryLogEntry>, StoreError>;

    /// Every entry matching `filter`, sorted per the filter.
    async fn scan_logs(&self, filter: &LogFilter) -> Result<Vec<InventoryLogEntry>, StoreError>;

    /// Latest snapshot whose `as_of` is at or before `as_of`.
    async fn latest_snapshot(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError>;

    async fn store_snapshot(&self, snapshot: &StockSnapshot) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        (**self).list_products(filter).await
    }

    async fn find_below_threshold(
        &self,
        scope: &BTreeSet<ProductId>,
    ) -> Result<Vec<Product>, StoreError> {
        (**self).find_below_threshold(scope).await
    }

    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        (**self).insert_product(product, opening).await
    }

    async fn commit_mutation(
        &self,
        product: &Product,
        expected: ExpectedVersion,
        entry: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        (**self).commit_mutation(product, expected, entry).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        (**self).delete_product(id).await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        (**self).get_category(id).await
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        (**self).upsert_category(category).await
    }

    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError> {
        (**self).get_staff(id).await
    }

    async fn upsert_staff(&self, staff: &StaffMember) -> Result<(), StoreError> {
        (**self).upsert_staff(staff).await
    }

    async fn count_entries(&self, product_id: ProductId) -> Result<u64, StoreError> {
        (**self).count_entries(product_id).await
    }

    async fn load_ledger(
        &self,
        product_id: ProductId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        (**self).load_ledger(product_id, until).await
    }

    async fn load_ledger_after(
        &self,
        product_id: ProductId,
        after: (DateTime<Utc>, u64),
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        (**self).load_ledger_after(product_id, after, until).await
    }

    async fn earliest_entry(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        (**self).earliest_entry(product_id).await
    }

    async fn query_logs(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Page<InventoryLogEntry>, StoreError> {
        (**self).query_logs(filter, pagination).await
    }

    async fn scan_logs(&self, filter: &LogFilter) -> Result<Vec<InventoryLogEntry>, StoreError> {
        (**self).scan_logs(filter).await
    }

    async fn latest_snapshot(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError> {
        (**self).latest_snapshot(product_id, as_of).await
    }

    async fn store_snapshot(&self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        (**self).store_snapshot(snapshot).await
    }
}
