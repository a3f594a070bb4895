//! Ledger persistence boundary.
//!
//! Products, their scope relations and their append-only ledgers live behind
//! `LedgerStore`, with an in-memory implementation for tests/dev and a Postgres
//! implementation for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, StoreError};
