//! Read-side reports over the ledger: log queries, stats and the dashboard.
//!
//! Every report is limited to the principal's visible products.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use invledger_auth::{Permission, Principal, authorize};
use invledger_core::{CategoryId, ProductId};
use invledger_inventory::{
    ActionType, InventoryLogEntry, LogFilter, LogSortField, Page, Pagination, Product,
    ProductFilter, SortDirection,
};

use crate::error::LedgerError;
use crate::ledger_store::LedgerStore;
use crate::scoping::AccessScoper;

pub const RECENT_LOGS: u32 = 10;

/// Log listing request. Unset fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    pub product_id: Option<ProductId>,
    pub category_id: Option<CategoryId>,
    pub action_types: Vec<ActionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort_by: LogSortField,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total_logs: u64,
    pub increase_logs: u64,
    pub decrease_logs: u64,
    /// Ascending by date; days without entries are omitted.
    pub logs_by_date: Vec<DailyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub product_count: usize,
    pub low_stock: Vec<Product>,
    pub recent_logs: Vec<InventoryLogEntry>,
}

#[derive(Debug, Clone)]
pub struct LedgerReports<S> {
    store: S,
    scoper: AccessScoper<S>,
}

impl<S> LedgerReports<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, scoper: AccessScoper<S>) -> Self {
        Self { store, scoper }
    }

    /// Visible ids, narrowed to one product and/or one category.
    async fn scope(
        &self,
        principal: &Principal,
        product_id: Option<ProductId>,
        category_id: Option<CategoryId>,
    ) -> Result<BTreeSet<ProductId>, LedgerError> {
        authorize(principal, Permission::ReadLedger)?;
        let mut ids = self.scoper.try_visible_product_ids(principal).await?;
        if let Some(id) = product_id {
            ids.retain(|visible| *visible == id);
        }
        if let Some(category_id) = category_id {
            if !ids.is_empty() {
                let filter = ProductFilter {
                    category_id: Some(category_id),
                    ..ProductFilter::with_ids(ids)
                };
                ids = self
                    .store
                    .list_products(&filter)
                    .await?
                    .iter()
                    .map(Product::id_typed)
                    .collect();
            }
        }
        Ok(ids)
    }

    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn query_logs(
        &self,
        principal: &Principal,
        query: LogQuery,
        pagination: Pagination,
    ) -> Result<Page<InventoryLogEntry>, LedgerError> {
        let ids = self
            .scope(principal, query.product_id, query.category_id)
            .await?;
        let filter = LogFilter::for_products(ids)
            .with_actions(query.action_types)
            .between(query.from, query.to)
            .sorted(query.sort_by, query.direction);
        filter.validate()?;
        if filter.product_ids.is_empty() {
            return Ok(Page::new(Vec::new(), 0, pagination));
        }
        Ok(self.store.query_logs(&filter, pagination).await?)
    }

    /// Totals and per-UTC-day counts over an optional date range.
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn inventory_stats(
        &self,
        principal: &Principal,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<InventoryStats, LedgerError> {
        let ids = self.scope(principal, None, None).await?;
        let filter = LogFilter::for_products(ids)
            .between(from, to)
            .sorted(LogSortField::CreatedAt, SortDirection::Asc);
        filter.validate()?;
        if filter.product_ids.is_empty() {
            return Ok(InventoryStats::default());
        }

        let entries = self.store.scan_logs(&filter).await?;
        let increase_logs = entries.iter().filter(|e| e.denotes_increase()).count() as u64;
        let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for entry in &entries {
            *by_date.entry(entry.created_at.date_naive()).or_default() += 1;
        }

        Ok(InventoryStats {
            total_logs: entries.len() as u64,
            increase_logs,
            decrease_logs: entries.len() as u64 - increase_logs,
            logs_by_date: by_date
                .into_iter()
                .map(|(date, count)| DailyCount { date, count })
                .collect(),
        })
    }

    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn dashboard(&self, principal: &Principal) -> Result<Dashboard, LedgerError> {
        let ids = self.scope(principal, None, None).await?;
        if ids.is_empty() {
            return Ok(Dashboard {
                product_count: 0,
                low_stock: Vec::new(),
                recent_logs: Vec::new(),
            });
        }

        let low_stock = self.store.find_below_threshold(&ids).await?;
        let product_count = ids.len();
        let recent = self
            .store
            .query_logs(
                &LogFilter::for_products(ids).sorted(LogSortField::CreatedAt, SortDirection::Desc),
                Pagination::new(Some(1), Some(RECENT_LOGS)),
            )
            .await?;

        Ok(Dashboard {
            product_count,
            low_stock,
            recent_logs: recent.items,
        })
    }
}
