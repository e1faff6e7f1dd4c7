use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use stockledger_core::ProductId;
use stockledger_ledger::{ProductBalance, StockStatus};

use super::{MonitorError, StockLevelMonitor};
use crate::clock::{Clock, SystemClock};
use crate::store::BalanceStore;

/// A product crossed into a status that needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub product_id: ProductId,
    pub status: StockStatus,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub raised_at: DateTime<Utc>,
}

impl StockAlert {
    fn from_balance(balance: &ProductBalance, raised_at: DateTime<Utc>) -> Self {
        Self {
            product_id: balance.product_id,
            status: balance.status(),
            current_stock: balance.current_stock,
            minimum_stock: balance.minimum_stock,
            maximum_stock: balance.maximum_stock,
            raised_at,
        }
    }
}

/// Where alerts are delivered.
pub trait AlertSink: Send + Sync + 'static {
    fn emit(&self, alert: StockAlert) -> Result<(), MonitorError>;
}

impl<A: AlertSink> AlertSink for Arc<A> {
    fn emit(&self, alert: StockAlert) -> Result<(), MonitorError> {
        (**self).emit(alert)
    }
}

/// Deliver to both sinks; the first failure wins.
impl<A: AlertSink, B: AlertSink> AlertSink for (A, B) {
    fn emit(&self, alert: StockAlert) -> Result<(), MonitorError> {
        self.0.emit(alert.clone())?;
        self.1.emit(alert)
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    inner: Mutex<Vec<StockAlert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StockAlert> {
        self.inner.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl AlertSink for InMemoryAlertSink {
    fn emit(&self, alert: StockAlert) -> Result<(), MonitorError> {
        self.inner
            .lock()
            .map_err(|_| MonitorError::Poisoned)?
            .push(alert);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: StockAlert) -> Result<(), MonitorError> {
        warn!(
            product_id = %alert.product_id,
            status = alert.status.as_str(),
            current_stock = alert.current_stock,
            minimum_stock = alert.minimum_stock,
            maximum_stock = alert.maximum_stock,
            "stock level alert"
        );
        Ok(())
    }
}

/// Raises an alert when a product enters out-of-stock, low-stock or
/// overstocked. Edge-triggered: a product that stays in the same status
/// alerts once.
pub struct ThresholdMonitor<B, A> {
    balances: Arc<B>,
    sink: A,
    clock: Arc<dyn Clock>,
    last_seen: Mutex<HashMap<ProductId, StockStatus>>,
}

impl<B, A> ThresholdMonitor<B, A>
where
    B: BalanceStore + 'static,
    A: AlertSink,
{
    pub fn new(balances: Arc<B>, sink: A) -> Self {
        Self {
            balances,
            sink,
            clock: Arc::new(SystemClock),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl<B, A> StockLevelMonitor for ThresholdMonitor<B, A>
where
    B: BalanceStore + 'static,
    A: AlertSink,
{
    async fn notify_levels_changed(&self) -> Result<(), MonitorError> {
        let flagged = self
            .balances
            .needing_attention()
            .await
            .map_err(|e| MonitorError::Query(e.to_string()))?;

        let now = self.clock.now();
        let mut last_seen = self.last_seen.lock().map_err(|_| MonitorError::Poisoned)?;

        let mut current = HashMap::with_capacity(flagged.len());
        for balance in &flagged {
            let status = balance.status();
            if last_seen.get(&balance.product_id) != Some(&status) {
                self.sink.emit(StockAlert::from_balance(balance, now))?;
            }
            // Recorded only once delivered, so a failed emit is retried.
            last_seen.insert(balance.product_id, status);
            current.insert(balance.product_id, status);
        }

        // Products back in stock re-arm.
        *last_seen = current;
        Ok(())
    }
}
