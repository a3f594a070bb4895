//! Infrastructure layer: ledger persistence, the ledger services and their
//! wiring.
//!
//! ```text
//! LedgerStore ─► StockMutator ─► AccessScoper ─► LedgerReconstructor ─► VarianceAnalyzer
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger_store;
pub mod mutator;
pub mod reconstructor;
pub mod reports;
pub mod scoping;
pub mod services;
pub mod variance;


pub use catalog::{CreateProduct, CreatedProduct, ProductCatalog};
pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use ledger_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
pub use mutator::{MutationOutcome, StockMutator};
pub use reconstructor::{LedgerReconstructor, ReplayReport};
pub use reports::{Dashboard, DailyCount, InventoryStats, LedgerReports, LogQuery};
pub use scoping::AccessScoper;
pub use services::{BuildError, LedgerServices, NotificationBus, SharedStore};
pub use variance::{
    ComparisonType, VarianceAnalyzer, VarianceBatch, VarianceQuery, VarianceReport, VarianceSummary,
    VarianceType,
};
