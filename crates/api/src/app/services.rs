use std::sync::Arc;

use chrono::{DateTime, Utc};

use stockledger_core::{ProductId, UserId};
use stockledger_events::{EventBus, InMemoryEventBus};
use stockledger_infra::{
    AppliedMovement, InMemoryAlertSink, InMemoryDirectory, InMemoryLedgerStore, LedgerEnvelope,
    LedgerError, LedgerOptions, LedgerStore, MonitorRunner, MonitorRunnerHandle, MovementFilter,
    MovementListing, MovementQueryService, ProductInfo, StockAlert, StockLedger, ThresholdMonitor,
    TracingAlertSink, UserInfo,
};
use stockledger_ledger::{AuditReport, BalanceSeed, MovementRequest, ProductBalance};

#[cfg(feature = "postgres")]
use stockledger_infra::PostgresLedgerStore;

use crate::config::AppConfig;

pub type LedgerBus = Arc<InMemoryEventBus<LedgerEnvelope>>;

/// Everything the routes need for one store backend.
pub struct Backend<S> {
    ledger: StockLedger<S, LedgerBus>,
    queries: MovementQueryService<S, InMemoryDirectory>,
    directory: Arc<InMemoryDirectory>,
    alerts: Arc<InMemoryAlertSink>,
    // Dropping the handle stops the monitor worker.
    _monitor: Option<MonitorRunnerHandle>,
}

impl<S> Backend<S>
where
    S: LedgerStore + 'static,
{
    fn wire(store: Arc<S>, config: &AppConfig) -> Self {
        let bus: LedgerBus = Arc::new(InMemoryEventBus::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let alerts = Arc::new(InMemoryAlertSink::new());

        let monitor = config.monitor_enabled.then(|| {
            let monitor = ThresholdMonitor::new(store.clone(), (TracingAlertSink, alerts.clone()));
            MonitorRunner::default().spawn("threshold", bus.subscribe(), Arc::new(monitor))
        });

        let options = LedgerOptions {
            store_timeout: config.store_timeout,
            max_conflict_retries: config.max_conflict_retries,
            ..LedgerOptions::default()
        };

        Self {
            ledger: StockLedger::new(store.clone(), bus).with_options(options),
            queries: MovementQueryService::new(store, directory.clone(), config.store_timeout),
            directory,
            alerts,
            _monitor: monitor,
        }
    }
}

/// Store-backend-specific services, selected at startup.
pub enum AppServices {
    InMemory(Backend<InMemoryLedgerStore>),
    #[cfg(feature = "postgres")]
    Persistent(Backend<PostgresLedgerStore>),
}

macro_rules! with_backend {
    ($services:expr, $backend:ident => $body:expr) => {
        match $services {
            AppServices::InMemory($backend) => $body,
            #[cfg(feature = "postgres")]
            AppServices::Persistent($backend) => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(config: &AppConfig) -> Self {
        AppServices::InMemory(Backend::wire(Arc::new(InMemoryLedgerStore::new()), config))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            AppServices::InMemory(_) => "in_memory",
            #[cfg(feature = "postgres")]
            AppServices::Persistent(_) => "postgres",
        }
    }

    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedMovement, LedgerError> {
        with_backend!(self, b => b.ledger.apply_movement(request).await)
    }

    pub async fn register_product(
        &self,
        seed: BalanceSeed,
        info: ProductInfo,
        user_id: Option<UserId>,
    ) -> Result<ProductBalance, LedgerError> {
        with_backend!(self, b => {
            let product_id = seed.product_id;
            let balance = b.ledger.register_product(seed, user_id).await?;
            if info.name.is_some() || info.sku.is_some() {
                b.directory.upsert_product(product_id, info);
            }
            Ok(balance)
        })
    }

    pub async fn update_thresholds(
        &self,
        product_id: ProductId,
        minimum_stock: i64,
        maximum_stock: i64,
        user_id: UserId,
    ) -> Result<ProductBalance, LedgerError> {
        with_backend!(self, b => {
            b.ledger
                .update_thresholds(product_id, minimum_stock, maximum_stock, Some(user_id))
                .await
        })
    }

    pub async fn balance(&self, product_id: ProductId) -> Result<ProductBalance, LedgerError> {
        with_backend!(self, b => b.ledger.balance(product_id).await)
    }

    pub async fn audit(&self, product_id: ProductId) -> Result<AuditReport, LedgerError> {
        with_backend!(self, b => b.ledger.audit(product_id).await)
    }

    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<MovementListing, LedgerError> {
        with_backend!(self, b => b.queries.list(filter, page, limit).await)
    }

    pub async fn list_product_movements(
        &self,
        product_id: ProductId,
        page: Option<u32>,
        limit: Option<u32>,
        as_of: Option<u64>,
    ) -> Result<MovementListing, LedgerError> {
        with_backend!(self, b => b.queries.list_for_product(product_id, page, limit, as_of).await)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        with_backend!(self, b => b.queries.count_since(since).await)
    }

    /// Record a display name for the acting user.
    pub fn remember_user(&self, user_id: UserId, name: Option<&str>) {
        if let Some(name) = name {
            with_backend!(self, b => b.directory.upsert_user(user_id, UserInfo {
                name: Some(name.to_string()),
            }))
        }
    }

    pub fn alerts(&self) -> Vec<StockAlert> {
        with_backend!(self, b => b.alerts.all())
    }
}

/// Build services from configuration.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres when the `postgres` feature is
/// compiled in; otherwise it falls back to in-memory with a warning.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            use anyhow::Context;

            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            let store = PostgresLedgerStore::connect(
                url,
                config.database_max_connections,
                config.store_timeout,
            )
            .await
            .context("failed to connect to Postgres")?;
            store.migrate().await.context("failed to apply migrations")?;

            tracing::info!("using postgres ledger store");
            return Ok(AppServices::Persistent(Backend::wire(Arc::new(store), config)));
        }

        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    Ok(AppServices::in_memory(config))
}
