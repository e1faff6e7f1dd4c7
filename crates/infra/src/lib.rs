//! Infrastructure layer: stores, the ledger engine, the stock level monitor
//! and the read-side listing facade.

pub mod clock;
pub mod directory;
pub mod engine;
pub mod listing;
pub mod monitor;
pub mod store;


pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{Directory, InMemoryDirectory, ProductInfo, UserInfo};
pub use engine::{AppliedMovement, LedgerEnvelope, LedgerError, LedgerOptions, StockLedger};
pub use listing::{MovementListing, MovementQueryService, MovementView, PageInfo};
pub use monitor::{
    AlertSink, InMemoryAlertSink, MonitorError, MonitorRunner, MonitorRunnerHandle, StockAlert,
    StockLevelMonitor, ThresholdMonitor, TracingAlertSink,
};
pub use store::{
    BalanceStore, InMemoryLedgerStore, LedgerStore, MovementFilter, MovementPage, MovementStore,
    Pagination, StoreError,
};
#[cfg(feature = "postgres")]
pub use store::PostgresLedgerStore;
