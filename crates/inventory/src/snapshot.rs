use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invledger_core::{DomainError, DomainResult, ProductId};

use crate::log_entry::InventoryLogEntry;

/// Cached fold of a product's ledger up to a point.
///
/// Snapshots only shortcut replay; the ledger stays authoritative and a
/// snapshot can be dropped at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub quantity: i64,
    /// `created_at` of the last folded entry.
    pub as_of: DateTime<Utc>,
    /// `sequence` of the last folded entry.
    pub through_sequence: u64,
    pub taken_at: DateTime<Utc>,
}

impl StockSnapshot {
    /// Fold `entries` (already in replay order) on top of an optional earlier
    /// snapshot. Returns `None` when there is nothing to fold at all.
    pub fn fold(
        product_id: ProductId,
        base: Option<&StockSnapshot>,
        entries: &[InventoryLogEntry],
        taken_at: DateTime<Utc>,
    ) -> DomainResult<Option<Self>> {
        let mut current = base.cloned();
        for entry in entries {
            if entry.product_id != product_id {
                return Err(DomainError::invariant("snapshot fold over a foreign entry"));
            }
            if current.as_ref().is_some_and(|s| !s.precedes(entry)) {
                return Err(DomainError::invariant(format!(
                    "entry {} is not after the folded range",
                    entry.sequence
                )));
            }
            let quantity = current.as_ref().map_or(0, |s| s.quantity) + entry.quantity;
            current = Some(Self {
                product_id,
                quantity,
                as_of: entry.created_at,
                through_sequence: entry.sequence,
                taken_at,
            });
        }
        Ok(current.map(|s| Self { taken_at, ..s }))
    }

    /// Whether `entry` comes after the folded range.
    pub fn precedes(&self, entry: &InventoryLogEntry) -> bool {
        entry.replay_key() > (self.as_of, self.through_sequence)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use invledger_auth::Actor;
    use invledger_core::{AdminId, LogEntryId};

    use super::*;
    use crate::ActionType;

    fn entry(product_id: ProductId, seq: u64, qty: i64, at: DateTime<Utc>) -> InventoryLogEntry {
        InventoryLogEntry {
            id: LogEntryId::new(),
            product_id,
            actor: Actor::Admin(AdminId::new()),
            action: if qty > 0 { ActionType::Add } else { ActionType::Remove },
            quantity: qty,
            note: None,
            created_at: at,
            sequence: seq,
            old_value: None,
            new_value: None,
        }
    }

    #[test]
    fn fold_continues_from_base() {
        let pid = ProductId::new();
        let t0 = Utc::now();
        let first = StockSnapshot::fold(pid, None, &[entry(pid, 1, 10, t0)], t0)
            .unwrap()
            .unwrap();
        assert_eq!(first.quantity, 10);

        let later = [entry(pid, 2, -4, t0 + Duration::hours(1))];
        assert!(first.precedes(&later[0]));
        let second = StockSnapshot::fold(pid, Some(&first), &later, t0).unwrap().unwrap();
        assert_eq!(second.quantity, 6);
        assert_eq!(second.through_sequence, 2);
    }

    #[test]
    fn fold_rejects_entries_already_covered() {
        let pid = ProductId::new();
        let t0 = Utc::now();
        let first = entry(pid, 1, 10, t0);
        let base = StockSnapshot::fold(pid, None, std::slice::from_ref(&first), t0)
            .unwrap()
            .unwrap();
        let err = StockSnapshot::fold(pid, Some(&base), &[first], t0).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn fold_of_nothing_is_none() {
        assert!(StockSnapshot::fold(ProductId::new(), None, &[], Utc::now())
            .unwrap()
            .is_none());
    }
}
