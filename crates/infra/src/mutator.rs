//! Stock Mutator: the only path that changes a product's stock level.
//!
//! ```text
//! validate input ──► role gate + fresh read + scope check
//!                         │
//!                         ▼
//!                  Product::handle (pure decision)
//!                         │
//!                         ▼
//!      commit product + entry (ExpectedVersion::Exact) ──conflict──► re-read, retry
//!                         │
//!                         ▼
//!           threshold notification (fire-and-forget)
//! ```
//!
//! Nothing is cached between attempts: every attempt starts from a fresh read,
//! so two concurrent mutations of the same product serialize through the
//! store's version check instead of losing an update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use invledger_auth::{Actor, Permission, Principal};
use invledger_core::{Aggregate, AggregateRoot, Clock, DomainError, ExpectedVersion, ProductId, Quantity};
use invledger_events::{Notification, NotificationSink, ThresholdReached};
use invledger_inventory::{
    ActionType, AdjustStock, ChangeThreshold, InventoryLogEntry, NewLogEntry, Product,
    SetStockLevel, StockCommand, StockEvent, parse_legacy_quantity,
};

use crate::error::LedgerError;
use crate::ledger_store::{LedgerStore, StoreError};
use crate::reconstructor::LedgerReconstructor;
use crate::scoping::AccessScoper;

/// Result of a committed (or no-op) mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Product state after the mutation.
    pub product: Product,
    /// The ledger entry written; `None` when nothing changed.
    pub entry: Option<InventoryLogEntry>,
    pub previous_level: i64,
    /// Whether a threshold notification was handed to the sink.
    pub notified: bool,
}

impl MutationOutcome {
    pub fn new_level(&self) -> i64 {
        self.product.number_of_stocks()
    }
}

#[derive(Clone)]
pub struct StockMutator<S> {
    store: S,
    scoper: AccessScoper<S>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    snapshot_every: u64,
}

impl<S> core::fmt::Debug for StockMutator<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockMutator")
            .field("max_retries", &self.max_retries)
            .field("snapshot_every", &self.snapshot_every)
            .finish_non_exhaustive()
    }
}

impl<S> StockMutator<S>
where
    S: LedgerStore + Clone,
{
    pub fn new(
        store: S,
        scoper: AccessScoper<S>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            scoper,
            sink,
            clock,
            max_retries,
            snapshot_every: 0,
        }
    }

    /// Take a snapshot every `every` ledger entries (0 disables).
    pub fn with_snapshots_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }

    /// Signed change: positive records INCREASE, negative DECREASE.
    #[instrument(skip(self, principal, note), fields(principal = %principal.principal_id), err)]
    pub async fn apply_delta(
        &self,
        principal: &Principal,
        product_id: ProductId,
        delta: i64,
        note: Option<String>,
    ) -> Result<MutationOutcome, LedgerError> {
        let actor = principal.actor().ok_or(LedgerError::Forbidden)?;
        let command = AdjustStock::from_delta(actor, delta, note, self.clock.now())?;
        self.adjust_quantity(principal, product_id, command.action, command.quantity, command.note)
            .await
    }

    /// Apply a legacy string quantity (`"+5"`, `"-15"`).
    pub async fn apply_legacy(
        &self,
        principal: &Principal,
        product_id: ProductId,
        raw_quantity: &str,
        note: Option<String>,
    ) -> Result<MutationOutcome, LedgerError> {
        let delta = parse_legacy_quantity(raw_quantity)?;
        self.apply_delta(principal, product_id, delta, note).await
    }

    /// Relative change whose direction comes from `action`.
    #[instrument(skip(self, principal, note), fields(principal = %principal.principal_id), err)]
    pub async fn adjust(
        &self,
        principal: &Principal,
        product_id: ProductId,
        action: ActionType,
        quantity: i64,
        note: Option<String>,
    ) -> Result<MutationOutcome, LedgerError> {
        let quantity = Quantity::new(quantity)?;
        if action.direction().is_none() {
            return Err(DomainError::validation(format!(
                "{action} sets an absolute level; use set_absolute"
            ))
            .into());
        }
        self.adjust_quantity(principal, product_id, action, quantity, note)
            .await
    }

    async fn adjust_quantity(
        &self,
        principal: &Principal,
        product_id: ProductId,
        action: ActionType,
        quantity: Quantity,
        note: Option<String>,
    ) -> Result<MutationOutcome, LedgerError> {
        self.execute(principal, product_id, Permission::MutateStock, |actor, at| {
            StockCommand::Adjust(AdjustStock {
                actor,
                action,
                quantity,
                note: note.clone(),
                occurred_at: at,
            })
        })
        .await
    }

    /// Absolute level, recorded as UPDATE_PRODUCT_NUMBER_OF_STOCKS with the
    /// computed delta. Setting the current level writes nothing.
    #[instrument(skip(self, principal, note), fields(principal = %principal.principal_id), err)]
    pub async fn set_absolute(
        &self,
        principal: &Principal,
        product_id: ProductId,
        new_level: i64,
        note: Option<String>,
    ) -> Result<MutationOutcome, LedgerError> {
        if new_level < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "stock level must be non-negative, got {new_level}"
            ))
            .into());
        }
        self.execute(principal, product_id, Permission::MutateStock, |actor, at| {
            StockCommand::SetLevel(SetStockLevel {
                actor,
                new_level,
                note: note.clone(),
                occurred_at: at,
            })
        })
        .await
    }

    /// Change the low-stock threshold (admin action, no ledger entry).
    #[instrument(skip(self, principal), fields(principal = %principal.principal_id), err)]
    pub async fn change_threshold(
        &self,
        principal: &Principal,
        product_id: ProductId,
        threshold: i64,
    ) -> Result<MutationOutcome, LedgerError> {
        if threshold < 0 {
            return Err(DomainError::validation(format!(
                "threshold must be non-negative, got {threshold}"
            ))
            .into());
        }
        self.execute(principal, product_id, Permission::ManageCatalog, |_, at| {
            StockCommand::ChangeThreshold(ChangeThreshold {
                threshold,
                occurred_at: at,
            })
        })
        .await
    }

    async fn execute(
        &self,
        principal: &Principal,
        product_id: ProductId,
        permission: Permission,
        command: impl Fn(Actor, DateTime<Utc>) -> StockCommand,
    ) -> Result<MutationOutcome, LedgerError> {
        let actor = principal.actor().ok_or(LedgerError::Forbidden)?;
        let mut attempt: u32 = 0;

        loop {
            let product = self
                .scoper
                .ensure_access(principal, product_id, permission)
                .await?;
            let previous_level = product.number_of_stocks();

            let events = product.handle(&command(actor, self.clock.now()))?;
            if events.is_empty() {
                return Ok(MutationOutcome {
                    product,
                    entry: None,
                    previous_level,
                    notified: false,
                });
            }

            let expected = ExpectedVersion::Exact(product.version());
            let mut next = product;
            for event in &events {
                next.apply(event);
            }
            let entry = events
                .iter()
                .find_map(StockEvent::as_adjustment)
                .map(NewLogEntry::from_adjustment);

            match self.store.commit_mutation(&next, expected, entry).await {
                Ok(stored) => {
                    info!(
                        product_id = %product_id,
                        actor = %actor,
                        previous_level,
                        new_level = next.number_of_stocks(),
                        status = next.status().as_str(),
                        sequence = stored.as_ref().map(|e| e.sequence),
                        "stock mutation committed"
                    );
                    let notified = self.notify_crossings(&next, &events);
                    if let Some(entry) = &stored {
                        self.maybe_snapshot(entry).await;
                    }
                    return Ok(MutationOutcome {
                        product: next,
                        entry: stored,
                        previous_level,
                        notified,
                    });
                }
                Err(StoreError::Concurrency(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(product_id = %product_id, attempt, reason = %msg, "stale product version; retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn notify_crossings(&self, product: &Product, events: &[StockEvent]) -> bool {
        let Some(event) = events.iter().find(|e| e.crossed_threshold()) else {
            return false;
        };
        let notification = Notification::StockThresholdReached(ThresholdReached::new(
            product.id_typed(),
            product.admin_id(),
            product.name(),
            product.number_of_stocks(),
            product.threshold(),
            invledger_events::Event::occurred_at(event),
        ));
        match self.sink.notify(notification) {
            Ok(()) => true,
            Err(e) => {
                warn!(product_id = %product.id_typed(), error = %e, "threshold notification dropped");
                false
            }
        }
    }

    async fn maybe_snapshot(&self, entry: &InventoryLogEntry) {
        if self.snapshot_every == 0 {
            return;
        }
        let count = match self.store.count_entries(entry.product_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(product_id = %entry.product_id, error = %e, "snapshot check failed");
                return;
            }
        };
        if count % self.snapshot_every != 0 {
            return;
        }
        let reconstructor = LedgerReconstructor::new(self.store.clone(), self.clock.clone());
        if let Err(e) = reconstructor.take_snapshot(entry.product_id).await {
            warn!(product_id = %entry.product_id, error = %e, "automatic snapshot failed");
        }
    }
}
