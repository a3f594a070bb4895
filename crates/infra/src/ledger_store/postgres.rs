//! Postgres-backed ledger store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Concurrent insert of the same key |
//! | Database (foreign key violation) | `23503` | `Integrity` | Unknown category, delete of a product with history |
//! | Database (check constraint violation) | `23514` | `Integrity` | Negative stock, rewrite of a ledger row |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Concurrency
//!
//! `commit_mutation` locks the product row with `SELECT ... FOR UPDATE` inside one
//! transaction, checks the expected version, then updates the row and inserts the
//! ledger entry. Either both land or neither does.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use invledger_auth::Actor;
use invledger_core::{
    AdminId, AggregateRoot, CategoryId, ExpectedVersion, LogEntryId, ProductId, StaffId,
};
use invledger_inventory::{
    Category, InventoryLogEntry, LogFilter, LogSortField, NewLogEntry, Page, Pagination, Product,
    ProductFilter, ProductRecord, SortDirection, StaffMember, StockSnapshot,
};

use super::r#trait::{LedgerStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_inventory_ledger.sql");

const PRODUCT_SELECT: &str = r#"
    SELECT
        p.id,
        p.name,
        p.category_id,
        p.admin_id,
        p.number_of_stocks,
        p.threshold,
        p.version,
        p.created_at,
        p.updated_at,
        COALESCE(
            array_agg(a.staff_id) FILTER (WHERE a.staff_id IS NOT NULL),
            '{}'
        ) AS assignees
    FROM products p
    LEFT JOIN product_assignees a ON a.product_id = p.id
"#;

const LOG_COLUMNS: &str = r#"
    sequence, id, product_id, actor_role, actor_id, action_type, quantity,
    note, old_value, new_value, created_at
"#;

const LOG_FILTER_WHERE: &str = r#"
    WHERE product_id = ANY($1)
      AND (cardinality($2::text[]) = 0 OR action_type = ANY($2))
      AND ($3::timestamptz IS NULL OR created_at >= $3)
      AND ($4::timestamptz IS NULL OR created_at <= $4)
"#;

/// Postgres-backed ledger store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; share the store
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, indexes and the append-only trigger if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_products(
        &self,
        operation: &'static str,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>, StoreError> {
        let ids: Option<Vec<Uuid>> = filter
            .ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| *id.as_uuid()).collect());
        let sql = format!(
            r#"{PRODUCT_SELECT}
            WHERE ($1::uuid[] IS NULL OR p.id = ANY($1))
              AND ($2::uuid IS NULL OR p.category_id = $2)
              AND ($3::uuid IS NULL OR p.admin_id = $3)
              AND (NOT $4 OR p.status = 'CRITICAL')
            GROUP BY p.id
            ORDER BY p.created_at ASC, p.id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .bind(filter.category_id.map(|c| *c.as_uuid()))
            .bind(filter.admin_id.map(|a| *a.as_uuid()))
            .bind(filter.below_threshold)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn fetch_logs(
        &self,
        operation: &'static str,
        filter: &LogFilter,
        window: Option<Pagination>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        let mut sql = format!(
            "SELECT {LOG_COLUMNS} FROM inventory_logs {LOG_FILTER_WHERE} ORDER BY {}",
            order_by(filter.sort_by, filter.direction)
        );
        if window.is_some() {
            sql.push_str(" LIMIT $5 OFFSET $6");
        }

        let mut query = sqlx::query(&sql)
            .bind(uuids(&filter.product_ids))
            .bind(
                filter
                    .action_types
                    .iter()
                    .map(|a| a.as_str().to_string())
                    .collect::<Vec<_>>(),
            )
            .bind(filter.from)
            .bind(filter.to);
        if let Some(p) = window {
            query = query.bind(i64::from(p.limit())).bind(p.offset() as i64);
        }

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(entry_from_row).collect()
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = $1 GROUP BY p.id");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(product_count = field::Empty), err)]
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let products = self.fetch_products("list_products", filter).await?;
        Span::current().record("product_count", products.len());
        Ok(products)
    }

    #[instrument(skip(self, scope), fields(scope_size = scope.len()), err)]
    async fn find_below_threshold(
        &self,
        scope: &BTreeSet<ProductId>,
    ) -> Result<Vec<Product>, StoreError> {
        let filter = ProductFilter {
            ids: Some(scope.clone()),
            below_threshold: true,
            ..ProductFilter::default()
        };
        self.fetch_products("find_below_threshold", &filter).await
    }

    #[instrument(skip(self, product, opening), fields(product_id = %product.id_typed()), err)]
    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, category_id, admin_id, number_of_stocks, threshold,
                status, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.category_id().as_uuid())
        .bind(product.admin_id().as_uuid())
        .bind(product.number_of_stocks())
        .bind(product.threshold())
        .bind(product.status().as_str())
        .bind(product.version() as i64)
        .bind(product.created_at())
        .bind(product.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        replace_assignees(&mut tx, product).await?;

        let stored = match opening {
            Some(entry) => Some(insert_entry(&mut tx, product, entry).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(
        skip(self, product, entry),
        fields(
            product_id = %product.id_typed(),
            expected_version = ?expected,
            sequence = field::Empty
        ),
        err
    )]
    async fn commit_mutation(
        &self,
        product: &Product,
        expected: ExpectedVersion,
        entry: Option<NewLogEntry>,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_product_version(&mut tx, product.id_typed()).await?;
        let Some(current) = current else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound("product"));
        };

        if !expected.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        sqlx::query(
            r#"
            UPDATE products
            SET name = $2,
                category_id = $3,
                number_of_stocks = $4,
                threshold = $5,
                status = $6,
                version = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.category_id().as_uuid())
        .bind(product.number_of_stocks())
        .bind(product.threshold())
        .bind(product.status().as_str())
        .bind(product.version() as i64)
        .bind(product.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        replace_assignees(&mut tx, product).await?;

        let stored = match entry {
            Some(entry) => Some(insert_entry(&mut tx, product, entry).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        if let Some(s) = &stored {
            Span::current().record("sequence", s.sequence);
        }
        Ok(stored)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("product"));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT id, name, admin_id FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        row.map(|row| {
            Ok(Category {
                id: CategoryId::from_uuid(row.try_get("id").map_err(decode_error)?),
                name: row.try_get("name").map_err(decode_error)?,
                admin_id: AdminId::from_uuid(row.try_get("admin_id").map_err(decode_error)?),
            })
        })
        .transpose()
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, admin_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(category.admin_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(staff_id = %id), err)]
    async fn get_staff(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                s.id,
                s.admin_id,
                s.name,
                COALESCE(
                    array_agg(c.category_id) FILTER (WHERE c.category_id IS NOT NULL),
                    '{}'
                ) AS categories
            FROM staff s
            LEFT JOIN staff_categories c ON c.staff_id = s.id
            WHERE s.id = $1
            GROUP BY s.id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_staff", e))?;

        row.map(|row| {
            let categories: Vec<Uuid> = row.try_get("categories").map_err(decode_error)?;
            Ok(StaffMember {
                id: StaffId::from_uuid(row.try_get("id").map_err(decode_error)?),
                admin_id: AdminId::from_uuid(row.try_get("admin_id").map_err(decode_error)?),
                name: row.try_get("name").map_err(decode_error)?,
                categories: categories.into_iter().map(CategoryId::from_uuid).collect(),
            })
        })
        .transpose()
    }

    #[instrument(skip(self, staff), fields(staff_id = %staff.id), err)]
    async fn upsert_staff(&self, staff: &StaffMember) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO staff (id, admin_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(staff.id.as_uuid())
        .bind(staff.admin_id.as_uuid())
        .bind(&staff.name)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_staff", e))?;

        sqlx::query("DELETE FROM staff_categories WHERE staff_id = $1")
            .bind(staff.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("clear_staff_categories", e))?;

        let categories: Vec<Uuid> = staff.categories.iter().map(|c| *c.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO staff_categories (staff_id, category_id) SELECT $1, unnest($2::uuid[])",
        )
        .bind(staff.id.as_uuid())
        .bind(categories)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_staff_categories", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn count_entries(&self, product_id: ProductId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM inventory_logs WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_entries", e))?;
        let n: i64 = row.try_get("n").map_err(decode_error)?;
        Ok(n as u64)
    }

    #[instrument(skip(self), fields(product_id = %product_id, entry_count = field::Empty), err)]
    async fn load_ledger(
        &self,
        product_id: ProductId,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LOG_COLUMNS} FROM inventory_logs
            WHERE product_id = $1 AND ($2::timestamptz IS NULL OR created_at <= $2)
            ORDER BY created_at ASC, sequence ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(until)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_ledger", e))?;
        Span::current().record("entry_count", rows.len());
        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn load_ledger_after(
        &self,
        product_id: ProductId,
        after: (DateTime<Utc>, u64),
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<InventoryLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LOG_COLUMNS} FROM inventory_logs
            WHERE product_id = $1
              AND (created_at, sequence) > ($2, $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at ASC, sequence ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(after.0)
            .bind(after.1 as i64)
            .bind(until)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_ledger_after", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn earliest_entry(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryLogEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {LOG_COLUMNS} FROM inventory_logs
            WHERE product_id = $1
            ORDER BY created_at ASC, sequence ASC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("earliest_entry", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(page = pagination.page(), limit = pagination.limit()), err)]
    async fn query_logs(
        &self,
        filter: &LogFilter,
        pagination: Pagination,
    ) -> Result<Page<InventoryLogEntry>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) AS n FROM inventory_logs {LOG_FILTER_WHERE}");
        let row = sqlx::query(&count_sql)
            .bind(uuids(&filter.product_ids))
            .bind(
                filter
                    .action_types
                    .iter()
                    .map(|a| a.as_str().to_string())
                    .collect::<Vec<_>>(),
            )
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_logs", e))?;
        let total: i64 = row.try_get("n").map_err(decode_error)?;

        let items = self.fetch_logs("query_logs", filter, Some(pagination)).await?;
        Ok(Page::new(items, total as u64, pagination))
    }

    #[instrument(skip(self, filter), err)]
    async fn scan_logs(&self, filter: &LogFilter) -> Result<Vec<InventoryLogEntry>, StoreError> {
        self.fetch_logs("scan_logs", filter, None).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn latest_snapshot(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<StockSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, quantity, as_of, through_sequence, taken_at
            FROM stock_snapshots
            WHERE product_id = $1 AND as_of <= $2
            ORDER BY as_of DESC, through_sequence DESC
            LIMIT 1
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(as_of)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_snapshot", e))?;

        row.map(|row| {
            let through: i64 = row.try_get("through_sequence").map_err(decode_error)?;
            Ok(StockSnapshot {
                product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
                quantity: row.try_get("quantity").map_err(decode_error)?,
                as_of: row.try_get("as_of").map_err(decode_error)?,
                through_sequence: through as u64,
                taken_at: row.try_get("taken_at").map_err(decode_error)?,
            })
        })
        .transpose()
    }

    #[instrument(
        skip(self, snapshot),
        fields(product_id = %snapshot.product_id, through_sequence = snapshot.through_sequence),
        err
    )]
    async fn store_snapshot(&self, snapshot: &StockSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_snapshots (product_id, through_sequence, quantity, as_of, taken_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, through_sequence)
            DO UPDATE SET
                quantity = EXCLUDED.quantity,
                as_of = EXCLUDED.as_of,
                taken_at = EXCLUDED.taken_at
            "#,
        )
        .bind(snapshot.product_id.as_uuid())
        .bind(snapshot.through_sequence as i64)
        .bind(snapshot.quantity)
        .bind(snapshot.as_of)
        .bind(snapshot.taken_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store_snapshot", e))?;
        Ok(())
    }
}

/// Lock the product row for the rest of the transaction and return its version.
async fn lock_product_version(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<Option<u64>, StoreError> {
    let row = sqlx::query("SELECT version FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;
    row.map(|row| {
        let version: i64 = row.try_get("version").map_err(decode_error)?;
        Ok(version as u64)
    })
    .transpose()
}

async fn replace_assignees(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM product_assignees WHERE product_id = $1")
        .bind(product.id_typed().as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("clear_assignees", e))?;

    let staff: Vec<Uuid> = product.assignees().iter().map(|s| *s.as_uuid()).collect();
    sqlx::query(
        "INSERT INTO product_assignees (product_id, staff_id) SELECT $1, unnest($2::uuid[])",
    )
    .bind(product.id_typed().as_uuid())
    .bind(staff)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_assignees", e))?;
    Ok(())
}

/// Append one entry. `created_at` is clamped to the product's latest entry so
/// replay order follows commit order; the caller holds the product row lock.
async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
    entry: NewLogEntry,
) -> Result<InventoryLogEntry, StoreError> {
    if entry.product_id != product.id_typed() {
        return Err(StoreError::Integrity(format!(
            "entry for product {} committed with product {}",
            entry.product_id,
            product.id_typed()
        )));
    }

    let (role, actor_id) = actor_columns(&entry.actor);
    let row = sqlx::query(
        r#"
        INSERT INTO inventory_logs (
            id, product_id, actor_role, actor_id, action_type, quantity,
            note, old_value, new_value, created_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9,
            GREATEST(
                $10::timestamptz,
                COALESCE(
                    (SELECT MAX(created_at) FROM inventory_logs WHERE product_id = $2),
                    $10::timestamptz
                )
            )
        )
        RETURNING sequence, created_at
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.product_id.as_uuid())
    .bind(role)
    .bind(actor_id)
    .bind(entry.action.as_str())
    .bind(entry.quantity)
    .bind(&entry.note)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;

    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;

    let mut stored = entry.into_entry(sequence as u64);
    stored.created_at = created_at;
    Ok(stored)
}

fn order_by(field: LogSortField, direction: SortDirection) -> String {
    let dir = match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    match field {
        LogSortField::CreatedAt => format!("created_at {dir}, sequence {dir}"),
        LogSortField::ActionType => {
            format!("action_type {dir}, created_at {dir}, sequence {dir}")
        }
        LogSortField::Quantity => format!("quantity {dir}, created_at {dir}, sequence {dir}"),
    }
}

fn uuids(ids: &BTreeSet<ProductId>) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

fn actor_columns(actor: &Actor) -> (&'static str, Uuid) {
    match actor {
        Actor::Admin(id) => ("ADMIN", *id.as_uuid()),
        Actor::Staff(id) => ("STAFF", *id.as_uuid()),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let assignees: Vec<Uuid> = row.try_get("assignees").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    Ok(Product::from_record(ProductRecord {
        id: ProductId::from_uuid(row.try_get("id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
        category_id: CategoryId::from_uuid(row.try_get("category_id").map_err(decode_error)?),
        admin_id: AdminId::from_uuid(row.try_get("admin_id").map_err(decode_error)?),
        number_of_stocks: row.try_get("number_of_stocks").map_err(decode_error)?,
        threshold: row.try_get("threshold").map_err(decode_error)?,
        assignees: assignees.into_iter().map(StaffId::from_uuid).collect(),
        version: version as u64,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    }))
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<InventoryLogEntry, StoreError> {
    let role: String = row.try_get("actor_role").map_err(decode_error)?;
    let actor_id: Uuid = row.try_get("actor_id").map_err(decode_error)?;
    let actor = match role.as_str() {
        "ADMIN" => Actor::Admin(AdminId::from_uuid(actor_id)),
        "STAFF" => Actor::Staff(StaffId::from_uuid(actor_id)),
        other => {
            return Err(StoreError::Backend(format!("unknown actor role '{other}' in ledger row")));
        }
    };
    let action: String = row.try_get("action_type").map_err(decode_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;

    Ok(InventoryLogEntry {
        id: LogEntryId::from_uuid(row.try_get("id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode_error)?),
        actor,
        action: action
            .parse()
            .map_err(|e| StoreError::Backend(format!("corrupt ledger row: {e}")))?,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        note: row.try_get("note").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        sequence: sequence as u64,
        old_value: row.try_get("old_value").map_err(decode_error)?,
        new_value: row.try_get("new_value").map_err(decode_error)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Concurrency(msg),
                // Foreign key / check constraint violation
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
