//! Ledger Reconstructor: historical stock levels rebuilt from the ledger.
//!
//! Replay order is `(created_at, sequence)`. Snapshots only shorten the fold;
//! replay verification never uses them.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use invledger_core::{Clock, DomainError, ProductId};
use invledger_inventory::{InventoryLogEntry, ProductFilter, StockSnapshot};

use crate::error::LedgerError;
use crate::ledger_store::LedgerStore;

/// Outcome of replaying one product's full ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub product_id: ProductId,
    /// `number_of_stocks` as stored on the product.
    pub stored: i64,
    /// Sum of every ledger delta.
    pub replayed: i64,
    pub entries: usize,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.replayed
    }

    pub fn drift(&self) -> i64 {
        self.stored - self.replayed
    }
}

#[derive(Debug, Clone)]
pub struct LedgerReconstructor<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S> LedgerReconstructor<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn ensure_product(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        self.store
            .get_product(product_id)
            .await?
            .map(|p| p.number_of_stocks())
            .ok_or(LedgerError::NotFound("product"))
    }

    /// Stock level as of `as_of`: every entry with `created_at <= as_of`.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn stock_at_date(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        self.ensure_product(product_id).await?;
        self.fold_until(product_id, as_of).await
    }

    pub(crate) async fn fold_until(
        &self,
        product_id: ProductId,
        as_of: DateTime<Utc>,
    ) -> Result<i64, LedgerError> {
        let (start, entries) = match self.store.latest_snapshot(product_id, as_of).await? {
            Some(snapshot) => {
                let after = (snapshot.as_of, snapshot.through_sequence);
                let rest = self
                    .store
                    .load_ledger_after(product_id, after, Some(as_of))
                    .await?;
                (snapshot.quantity, rest)
            }
            None => (0, self.store.load_ledger(product_id, Some(as_of)).await?),
        };
        Ok(start + entries.iter().map(|e| e.quantity).sum::<i64>())
    }

    /// Mean of per-UTC-day closing balances across `[from, to]`.
    ///
    /// Each day closes at its last instant, except the final day, which closes
    /// at `to`. A ledger with no entries up to `to` averages to 0.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn average_stock(
        &self,
        product_id: ProductId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, LedgerError> {
        if from > to {
            return Err(DomainError::validation(format!(
                "average window starts after it ends ({from} > {to})"
            ))
            .into());
        }
        self.ensure_product(product_id).await?;

        let entries = self.store.load_ledger(product_id, Some(to)).await?;
        if entries.is_empty() {
            return Ok(0.0);
        }

        let closings = daily_closings(from, to);
        let balances = balances_at(&entries, &closings);
        let days = balances.len() as f64;
        Ok(balances.iter().map(|b| *b as f64).sum::<f64>() / days)
    }

    /// Quantity of the first entry if it raised stock, else 0.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn baseline_stock(&self, product_id: ProductId) -> Result<i64, LedgerError> {
        self.ensure_product(product_id).await?;
        Ok(self.baseline_of(product_id).await?.0)
    }

    /// Baseline quantity and the timestamp of the entry it was read from.
    pub(crate) async fn baseline_of(
        &self,
        product_id: ProductId,
    ) -> Result<(i64, Option<DateTime<Utc>>), LedgerError> {
        let first = self.store.earliest_entry(product_id).await?;
        let baseline = first
            .as_ref()
            .filter(|e| e.denotes_increase())
            .map_or(0, |e| e.quantity);
        Ok((baseline, first.map(|e| e.created_at)))
    }

    /// Fold everything since the latest snapshot into a new one.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn take_snapshot(
        &self,
        product_id: ProductId,
    ) -> Result<Option<StockSnapshot>, LedgerError> {
        let now = self.clock.now();
        let base = self.store.latest_snapshot(product_id, now).await?;
        let entries = match &base {
            Some(s) => {
                self.store
                    .load_ledger_after(product_id, (s.as_of, s.through_sequence), None)
                    .await?
            }
            None => self.store.load_ledger(product_id, None).await?,
        };
        if entries.is_empty() {
            return Ok(base);
        }

        let snapshot = StockSnapshot::fold(product_id, base.as_ref(), &entries, now)?;
        if let Some(snapshot) = &snapshot {
            self.store.store_snapshot(snapshot).await?;
            info!(
                product_id = %product_id,
                quantity = snapshot.quantity,
                through_sequence = snapshot.through_sequence,
                "snapshot stored"
            );
        }
        Ok(snapshot)
    }

    /// Replay the whole ledger from zero and compare with the stored level.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn verify_replay(&self, product_id: ProductId) -> Result<ReplayReport, LedgerError> {
        let stored = self.ensure_product(product_id).await?;
        let entries = self.store.load_ledger(product_id, None).await?;
        let report = ReplayReport {
            product_id,
            stored,
            replayed: entries.iter().map(|e| e.quantity).sum(),
            entries: entries.len(),
        };
        if !report.is_consistent() {
            error!(
                product_id = %product_id,
                stored = report.stored,
                replayed = report.replayed,
                entries = report.entries,
                "ledger replay drift"
            );
        }
        Ok(report)
    }

    /// `verify_replay` over every product in the store.
    pub async fn verify_all(&self) -> Result<Vec<ReplayReport>, LedgerError> {
        let products = self.store.list_products(&ProductFilter::default()).await?;
        let mut reports = Vec::with_capacity(products.len());
        for product in products {
            reports.push(self.verify_replay(product.id_typed()).await?);
        }
        Ok(reports)
    }
}

/// Closing instants for each UTC day in `[from, to]`.
fn daily_closings(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let last_day = to.date_naive();
    let mut day: NaiveDate = from.date_naive();
    let mut closings = Vec::new();
    while day < last_day {
        closings.push(end_of_day(day));
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    closings.push(to);
    closings
}

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    day.and_time(last).and_utc()
}

/// Running balance at each (ascending) instant.
fn balances_at(entries: &[InventoryLogEntry], instants: &[DateTime<Utc>]) -> Vec<i64> {
    let mut balance = 0;
    let mut next = 0;
    instants
        .iter()
        .map(|instant| {
            while let Some(entry) = entries.get(next) {
                if entry.created_at > *instant {
                    break;
                }
                balance += entry.quantity;
                next += 1;
            }
            balance
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use invledger_core::{AdminId, ManualClock};
    use invledger_inventory::{Category, NewLogEntry, NewProduct, Product};

    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn closings_cover_each_day_and_end_at_to() {
        let closings = daily_closings(day(1, 9), day(3, 8));
        assert_eq!(closings.len(), 3);
        assert_eq!(closings[0].date_naive(), day(1, 0).date_naive());
        assert_eq!(closings[2], day(3, 8));
        assert_eq!(daily_closings(day(2, 5), day(2, 5)), vec![day(2, 5)]);
    }

    #[test]
    fn balances_accumulate_across_instants() {
        let entry = |qty: i64, at: DateTime<Utc>, seq: u64| InventoryLogEntry {
            id: invledger_core::LogEntryId::new(),
            product_id: ProductId::new(),
            actor: invledger_auth::Actor::Admin(AdminId::new()),
            action: invledger_inventory::ActionType::Add,
            quantity: qty,
            note: None,
            created_at: at,
            sequence: seq,
            old_value: None,
            new_value: None,
        };
        let entries = vec![entry(10, day(1, 10), 1), entry(-4, day(2, 10), 2)];
        assert_eq!(
            balances_at(&entries, &[day(1, 9), day(1, 23), day(3, 0)]),
            vec![0, 10, 6]
        );
    }

    async fn seeded(initial: i64) -> (Arc<InMemoryLedgerStore>, ProductId, Arc<ManualClock>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let admin = AdminId::new();
        let category = Category::new("Paint", admin).unwrap();
        store.upsert_category(&category).await.unwrap();
        let (product, opening) = Product::create(NewProduct {
            name: "Primer".to_string(),
            category_id: category.id,
            admin_id: admin,
            initial_stock: initial,
            threshold: None,
            occurred_at: day(1, 8),
        })
        .unwrap();
        store
            .insert_product(&product, opening.as_ref().map(NewLogEntry::from_adjustment))
            .await
            .unwrap();
        (store, product.id_typed(), Arc::new(ManualClock::new(day(1, 8))))
    }

    #[tokio::test]
    async fn stock_at_date_ignores_later_entries() {
        let (store, pid, clock) = seeded(12).await;
        let r = LedgerReconstructor::new(store, clock);
        assert_eq!(r.stock_at_date(pid, day(1, 7)).await.unwrap(), 0);
        assert_eq!(r.stock_at_date(pid, day(1, 8)).await.unwrap(), 12);
        assert_eq!(r.baseline_stock(pid).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn average_of_single_instant_matches_point_in_time() {
        let (store, pid, clock) = seeded(7).await;
        let r = LedgerReconstructor::new(store, clock);
        let at = day(4, 12);
        assert_eq!(
            r.average_stock(pid, at, at).await.unwrap(),
            r.stock_at_date(pid, at).await.unwrap() as f64
        );
        assert_eq!(r.average_stock(pid, day(1, 0), day(1, 1)).await.unwrap(), 0.0);
        assert!(matches!(
            r.average_stock(pid, day(2, 0), day(1, 0)).await,
            Err(LedgerError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn snapshots_shortcut_without_changing_results() {
        let (store, pid, clock) = seeded(5).await;
        clock.advance(Duration::days(1));
        let r = LedgerReconstructor::new(store.clone(), clock.clone());
        let snap = r.take_snapshot(pid).await.unwrap().unwrap();
        assert_eq!(snap.quantity, 5);
        assert_eq!(r.stock_at_date(pid, day(9, 0)).await.unwrap(), 5);

        let report = r.verify_replay(pid).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.entries, 1);
    }

    mod props {
        use invledger_auth::Principal;
        use invledger_events::NoopNotificationSink;
        use proptest::prelude::*;

        use super::*;
        use crate::config::LedgerConfig;
        use crate::mutator::StockMutator;
        use crate::scoping::AccessScoper;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 48,
                .. ProptestConfig::default()
            })]

            #[test]
            fn history_matches_prefix_sums(
                initial in 0i64..40,
                steps in proptest::collection::vec((-15i64..=15, 0i64..36), 1..30),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let (store, pid, clock) = seeded(initial).await;
                    let admin = store.get_product(pid).await.unwrap().unwrap().admin_id();
                    let principal = Principal::admin(admin);
                    let config = LedgerConfig::default();
                    let mutator = StockMutator::new(
                        store.clone(),
                        AccessScoper::new(store.clone(), config.staff_scope),
                        Arc::new(NoopNotificationSink),
                        clock.clone(),
                        config.max_mutation_retries,
                    )
                    .with_snapshots_every(4);
                    let r = LedgerReconstructor::new(store.clone(), clock.clone());

                    let mut expected = vec![(day(1, 8), initial)];
                    let mut level = initial;
                    for (delta, gap_hours) in steps {
                        clock.advance(Duration::hours(gap_hours));
                        if delta == 0 {
                            continue;
                        }
                        match mutator.apply_delta(&principal, pid, delta, None).await {
                            Ok(outcome) => {
                                level += delta;
                                prop_assert_eq!(outcome.new_level(), level);
                                expected.push((clock.now(), level));
                            }
                            Err(e) => {
                                prop_assert!(level + delta < 0);
                                prop_assert_eq!(e.code(), "INSUFFICIENT_STOCK");
                            }
                        }
                    }

                    // Entries sharing an instant all count: the level at `at`
                    // is the last one recorded at that instant.
                    for (i, (at, _)) in expected.iter().enumerate() {
                        let closing = expected[i..]
                            .iter()
                            .take_while(|(t, _)| t == at)
                            .last()
                            .map(|(_, l)| *l);
                        prop_assert_eq!(Some(r.stock_at_date(pid, *at).await.unwrap()), closing);
                        prop_assert_eq!(
                            r.average_stock(pid, *at, *at).await.unwrap(),
                            r.stock_at_date(pid, *at).await.unwrap() as f64
                        );
                    }
                    prop_assert!(r.verify_replay(pid).await.unwrap().is_consistent());
                    Ok(())
                })?;
            }
        }
    }
}
