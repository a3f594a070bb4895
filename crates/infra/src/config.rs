//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables fall back to
//! development defaults (in-memory stores, product-level staff scoping).

use std::str::FromStr;

use thiserror::Error;

use invledger_auth::StaffScopeMode;
use invledger_observability::{LogFormat, ObservabilityConfig};

pub const DEFAULT_MAX_MUTATION_RETRIES: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    /// Re-reads allowed after an optimistic concurrency conflict.
    pub max_mutation_retries: u32,
    pub staff_scope: StaffScopeMode,
    /// Ledger entries between automatic snapshots; 0 disables them.
    pub snapshot_every: u64,
    pub log_format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            max_mutation_retries: DEFAULT_MAX_MUTATION_RETRIES,
            staff_scope: StaffScopeMode::default(),
            snapshot_every: 0,
            log_format: LogFormat::default(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let use_persistent_stores = parse_var(&lookup, "USE_PERSISTENT_STORES", |raw| {
            raw.parse::<bool>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.use_persistent_stores);

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_mutation_retries = parse_var(&lookup, "LEDGER_MAX_MUTATION_RETRIES", |raw| {
            raw.parse::<u32>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.max_mutation_retries);

        let staff_scope = parse_var(&lookup, "LEDGER_STAFF_SCOPE", |raw| {
            StaffScopeMode::from_str(raw).map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.staff_scope);

        let snapshot_every = parse_var(&lookup, "LEDGER_SNAPSHOT_EVERY", |raw| {
            raw.parse::<u64>().map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.snapshot_every);

        let log_format = parse_var(&lookup, "LEDGER_LOG_FORMAT", |raw| {
            LogFormat::from_str(raw).map_err(|e| e.to_string())
        })?
        .unwrap_or(defaults.log_format);

        Ok(Self {
            use_persistent_stores,
            database_url,
            max_mutation_retries,
            staff_scope,
            snapshot_every,
            log_format,
        })
    }

    pub fn observability(&self) -> ObservabilityConfig {
        ObservabilityConfig {
            format: self.log_format,
            ..ObservabilityConfig::default()
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse(raw.trim()).map(Some).map_err(|reason| ConfigError::Invalid {
            var,
            value: raw,
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(LedgerConfig::from_lookup(lookup(&[])).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn persistent_mode_requires_database_url() {
        let err = LedgerConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_STAFF_SCOPE", "category"),
            ("LEDGER_SNAPSHOT_EVERY", "50"),
            ("LEDGER_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.staff_scope, StaffScopeMode::CategoryAssignment);
        assert_eq!(cfg.snapshot_every, 50);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_are_reported_with_their_variable() {
        let err = LedgerConfig::from_lookup(lookup(&[("LEDGER_MAX_MUTATION_RETRIES", "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "LEDGER_MAX_MUTATION_RETRIES", .. }
        ));
    }
}
