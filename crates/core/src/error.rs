//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error taxonomy shared by every layer.
///
/// The HTTP layer (outside this workspace) maps these to status codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Validation and authorization failures need caller correction; everything else
    /// may succeed on retry.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Validation | ErrorKind::Forbidden)
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, inverted date range).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stock quantity was not a positive integer (or a non-negative target level).
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The mutation would drive stock below zero.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// A conflict occurred (history blocking a delete, duplicates).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidQuantity(_) | DomainError::InvalidId(_) => {
                ErrorKind::Validation
            }
            DomainError::InvariantViolation(_) => ErrorKind::Internal,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InsufficientStock { .. } | DomainError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}
