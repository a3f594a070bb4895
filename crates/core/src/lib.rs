//! `invledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate/entity/value-object traits and
//! the injectable clock used to timestamp ledger entries.

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AdminId, CategoryId, LogEntryId, ProductId, StaffId, UserId};
pub use value_object::{Quantity, ValueObject};
