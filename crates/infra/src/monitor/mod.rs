//! Stock Level Monitor: the advisory consumer of committed movements.
//!
//! The ledger never calls a monitor directly. It publishes post-commit events;
//! [`MonitorRunner`] turns those into coalesced `notify_levels_changed()` calls,
//! so a slow or failing monitor cannot delay or undo a commit.

pub mod runner;
pub mod threshold;

use async_trait::async_trait;
use thiserror::Error;

pub use runner::{MonitorRunner, MonitorRunnerHandle};
pub use threshold::{AlertSink, InMemoryAlertSink, StockAlert, ThresholdMonitor, TracingAlertSink};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("stock level query failed: {0}")]
    Query(String),

    #[error("alert delivery failed: {0}")]
    Delivery(String),

    #[error("monitor state lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait StockLevelMonitor: Send + Sync + 'static {
    /// Something changed; re-evaluate current levels.
    ///
    /// Carries no payload: the monitor queries what it needs itself.
    async fn notify_levels_changed(&self) -> Result<(), MonitorError>;
}
