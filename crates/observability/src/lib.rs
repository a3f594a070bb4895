//! Tracing and logging setup shared by the ledger services and the audit binary.

/// Initialize process-wide observability with defaults (JSON, `RUST_LOG` or `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(&ObservabilityConfig::default());
}

/// Initialize with an explicit configuration.
pub fn init_with(config: &ObservabilityConfig) {
    crate::tracing::init(config);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, LogFormatError, ObservabilityConfig};
