//! Service-level error returned by every ledger operation.

use thiserror::Error;

use invledger_auth::AuthzError;
use invledger_core::{DomainError, ErrorKind};

use crate::ledger_store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Deterministic domain failure (validation, insufficient stock, ...).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Role gate or access scoper refused the principal.
    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Optimistic concurrency retries ran out. Reported as `Internal`: the
    /// request was valid and may succeed when contention drops.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store failure: {0}")]
    Store(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::Concurrency(msg),
            StoreError::NotFound(entity) => LedgerError::NotFound(entity),
            StoreError::Integrity(msg) => LedgerError::Integrity(msg),
            StoreError::Backend(msg) => LedgerError::Store(msg),
        }
    }
}

impl From<AuthzError> for LedgerError {
    fn from(_: AuthzError) -> Self {
        LedgerError::Forbidden
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(e) => e.kind(),
            LedgerError::Forbidden => ErrorKind::Forbidden,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Integrity(_) => ErrorKind::Conflict,
            LedgerError::Concurrency(_) | LedgerError::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Stable error code for callers that expose errors over the wire.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Domain(DomainError::InvalidQuantity(_)) => "INVALID_QUANTITY",
            LedgerError::Domain(DomainError::InsufficientStock { .. }) => "INSUFFICIENT_STOCK",
            LedgerError::NotFound("product") | LedgerError::Domain(DomainError::NotFound("product")) => {
                "PRODUCT_NOT_FOUND"
            }
            other => match other.kind() {
                ErrorKind::NotFound => "NOT_FOUND",
                ErrorKind::Forbidden => "FORBIDDEN",
                ErrorKind::Validation => "VALIDATION",
                ErrorKind::Conflict => "CONFLICT",
                ErrorKind::Internal => "INTERNAL",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_error_taxonomy() {
        let insufficient: LedgerError = DomainError::InsufficientStock {
            available: 2,
            requested: 5,
        }
        .into();
        assert_eq!(insufficient.code(), "INSUFFICIENT_STOCK");
        assert_eq!(insufficient.kind(), ErrorKind::Conflict);

        let missing: LedgerError = StoreError::NotFound("product").into();
        assert_eq!(missing.code(), "PRODUCT_NOT_FOUND");

        assert_eq!(LedgerError::Forbidden.code(), "FORBIDDEN");
        assert!(!LedgerError::Forbidden.is_retryable());
        assert!(LedgerError::Store("io".to_string()).is_retryable());
    }

    #[test]
    fn exhausted_retries_are_not_reported_as_insufficient_stock() {
        let contended: LedgerError = StoreError::Concurrency("expected 3, found 4".to_string()).into();
        assert_eq!(contended.kind(), ErrorKind::Internal);
        assert_eq!(contended.code(), "INTERNAL");
        assert!(contended.is_retryable());

        let insufficient: LedgerError = DomainError::InsufficientStock {
            available: 0,
            requested: 1,
        }
        .into();
        assert_ne!(contended.kind(), insufficient.kind());
    }
}
