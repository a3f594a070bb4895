//! Inventory ledger domain (pure, deterministic).
//!
//! Products own an append-only ledger of stock movements. This crate decides
//! stock mutations and describes ledger entries; it performs no IO. Persisting a
//! product update together with its entry is the infrastructure layer's job.

pub mod category;
pub mod filter;
pub mod log_entry;
pub mod product;
pub mod snapshot;

pub use category::{Category, StaffMember};
pub use filter::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, LogFilter, LogSortField, Page, Pagination, PaginationParams, ProductFilter, SortDirection};
pub use log_entry::{ActionType, Direction, InventoryLogEntry, NewLogEntry, format_quantity, parse_legacy_quantity};
pub use product::{
    AdjustStock, ChangeThreshold, NewProduct, Product, ProductRecord, SetStockLevel, StockAdjusted, StockCommand,
    StockEvent, StockStatus, ThresholdChanged, DEFAULT_THRESHOLD,
};
pub use snapshot::StockSnapshot;
