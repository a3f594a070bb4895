//! Typed query filters.
//!
//! Filters are validated before they reach a store. The in-memory store applies
//! them with `matches`/`sort_entries`; the Postgres store translates them to SQL
//! with the same semantics.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invledger_core::{AdminId, CategoryId, DomainError, DomainResult, ProductId};

use crate::log_entry::{ActionType, InventoryLogEntry};
use crate::product::Product;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page-based pagination (1-based pages, limit in `1..=MAX_PAGE_SIZE`).
///
/// Deserialization goes through [`Pagination::new`], so out-of-range input is
/// clamped instead of reaching the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationParams")]
pub struct Pagination {
    page: u32,
    limit: u32,
}

/// Raw pagination input as it arrives from callers.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(params.page, params.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSortField {
    #[default]
    CreatedAt,
    ActionType,
    Quantity,
}

impl FromStr for LogSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "actionType" | "action_type" => Ok(Self::ActionType),
            "quantity" => Ok(Self::Quantity),
            other => Err(DomainError::validation(format!("cannot sort logs by '{other}'"))),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DomainError::validation(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// Ledger entry filter.
///
/// `product_ids` is a hard restriction: callers put the principal's visible set
/// (optionally narrowed) here, and an empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub product_ids: BTreeSet<ProductId>,
    pub action_types: Vec<ActionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort_by: LogSortField,
    pub direction: SortDirection,
}

impl LogFilter {
    pub fn for_products(product_ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            product_ids: product_ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = ActionType>) -> Self {
        self.action_types = actions.into_iter().collect();
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn sorted(mut self, sort_by: LogSortField, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::validation(format!(
                    "date range is inverted ({from} > {to})"
                )));
            }
        }
        Ok(())
    }

    pub fn matches_entry(&self, entry: &InventoryLogEntry) -> bool {
        self.product_ids.contains(&entry.product_id)
            && (self.action_types.is_empty() || self.action_types.contains(&entry.action))
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
    }

    pub fn compare(&self, a: &InventoryLogEntry, b: &InventoryLogEntry) -> Ordering {
        let primary = match self.sort_by {
            LogSortField::CreatedAt => Ordering::Equal,
            LogSortField::ActionType => a.action.as_str().cmp(b.action.as_str()),
            LogSortField::Quantity => a.quantity.cmp(&b.quantity),
        };
        let ordering = primary.then_with(|| a.replay_key().cmp(&b.replay_key()));
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    pub fn sort_entries(&self, entries: &mut [InventoryLogEntry]) {
        entries.sort_by(|a, b| self.compare(a, b));
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let limit = u64::from(pagination.limit());
        let pages = total.div_ceil(limit);
        Self {
            has_more: pagination.offset() + (items.len() as u64) < total,
            items,
            total,
            page: pagination.page(),
            limit: pagination.limit(),
            pages,
        }
    }

    /// Cut one page out of an already ordered result set.
    pub fn slice(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit() as usize)
            .collect();
        Self::new(items, total, pagination)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            pages: self.pages,
            has_more: self.has_more,
        }
    }
}

/// Product listing filter. `ids = None` means no id restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub ids: Option<BTreeSet<ProductId>>,
    pub category_id: Option<CategoryId>,
    pub admin_id: Option<AdminId>,
    pub below_threshold: bool,
}

impl ProductFilter {
    pub fn owned_by(admin_id: AdminId) -> Self {
        Self {
            admin_id: Some(admin_id),
            ..Self::default()
        }
    }

    pub fn with_ids(ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        self.ids.as_ref().is_none_or(|ids| ids.contains(&product.id_typed()))
            && self.category_id.is_none_or(|c| c == product.category_id())
            && self.admin_id.is_none_or(|a| a == product.admin_id())
            && (!self.below_threshold || product.is_below_threshold())
    }
}
