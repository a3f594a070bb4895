//! Service wiring.
//!
//! `USE_PERSISTENT_STORES=true` selects the Postgres store; otherwise everything
//! runs in memory. Threshold notifications go to an in-memory bus unless the
//! caller supplies its own sink.

use std::sync::Arc;

use tracing::info;

use invledger_core::{Clock, SystemClock};
use invledger_events::{
    BusNotificationSink, EventEnvelope, InMemoryEventBus, Notification, NotificationSink,
};

use crate::catalog::ProductCatalog;
use crate::config::{ConfigError, LedgerConfig};
use crate::ledger_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
use crate::mutator::StockMutator;
use crate::reconstructor::LedgerReconstructor;
use crate::reports::LedgerReports;
use crate::scoping::AccessScoper;
use crate::variance::VarianceAnalyzer;

pub type SharedStore = Arc<dyn LedgerStore>;
pub type NotificationBus = Arc<InMemoryEventBus<EventEnvelope<Notification>>>;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every ledger service, sharing one store.
#[derive(Clone)]
pub struct LedgerServices {
    pub store: SharedStore,
    pub scoper: AccessScoper<SharedStore>,
    pub mutator: StockMutator<SharedStore>,
    pub reconstructor: LedgerReconstructor<SharedStore>,
    pub variance: VarianceAnalyzer<SharedStore>,
    pub catalog: ProductCatalog<SharedStore>,
    pub reports: LedgerReports<SharedStore>,
    /// Set when notifications go to the built-in bus.
    pub notifications: Option<NotificationBus>,
}

impl LedgerServices {
    /// Wire services from configuration, connecting to Postgres when asked.
    pub async fn build(config: &LedgerConfig) -> Result<Self, BuildError> {
        let bus: NotificationBus = Arc::new(InMemoryEventBus::new());
        let sink = Arc::new(BusNotificationSink::new(bus.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: SharedStore = if config.use_persistent_stores {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let store = PostgresLedgerStore::connect(url).await?;
            store.ensure_schema().await?;
            info!("using postgres ledger store");
            Arc::new(store)
        } else {
            info!("using in-memory ledger store");
            Arc::new(InMemoryLedgerStore::new())
        };

        let mut services = Self::with_store(store, config, sink, clock);
        services.notifications = Some(bus);
        Ok(services)
    }

    pub fn in_memory(
        config: &LedgerConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_store(Arc::new(InMemoryLedgerStore::new()), config, sink, clock)
    }

    pub fn with_store(
        store: SharedStore,
        config: &LedgerConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scoper = AccessScoper::new(store.clone(), config.staff_scope);
        let mutator = StockMutator::new(
            store.clone(),
            scoper.clone(),
            sink,
            clock.clone(),
            config.max_mutation_retries,
        )
        .with_snapshots_every(config.snapshot_every);
        let reconstructor = LedgerReconstructor::new(store.clone(), clock.clone());
        let variance = VarianceAnalyzer::new(store.clone(), scoper.clone(), clock.clone());
        let catalog = ProductCatalog::new(
            store.clone(),
            scoper.clone(),
            mutator.clone(),
            clock,
            config.max_mutation_retries,
        );
        let reports = LedgerReports::new(store.clone(), scoper.clone());

        Self {
            store,
            scoper,
            mutator,
            reconstructor,
            variance,
            catalog,
            reports,
            notifications: None,
        }
    }
}
