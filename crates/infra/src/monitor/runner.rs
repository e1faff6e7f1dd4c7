use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stockledger_events::Subscription;

use super::StockLevelMonitor;
use crate::engine::LedgerEnvelope;

/// How often the bus bridge checks for shutdown while the bus is idle.
const BRIDGE_POLL: Duration = Duration::from_millis(100);

/// Config for the stock level monitor runner.
#[derive(Debug, Clone)]
pub struct MonitorRunner {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for MonitorRunner {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

/// Handle for a running monitor runner (shutdown + manual trigger).
#[derive(Debug)]
pub struct MonitorRunnerHandle {
    shutdown: watch::Sender<bool>,
    trigger: mpsc::Sender<()>,
    bridge: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl MonitorRunnerHandle {
    /// Request a run without a bus event.
    ///
    /// Triggers are coalesced: if a run is already pending this is a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop both tasks and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.worker.await;
        let _ = self.bridge.await;
    }
}

impl MonitorRunner {
    /// Start consuming `subscription` and driving `monitor`.
    ///
    /// Must be called from within a tokio runtime.
    /// - every ledger event becomes a trigger; pending triggers merge into one run
    /// - failures are logged and retried with bounded exponential backoff, then
    ///   dropped until the next trigger; they never reach the ledger
    pub fn spawn<M>(
        &self,
        name: &'static str,
        subscription: Subscription<LedgerEnvelope>,
        monitor: Arc<M>,
    ) -> MonitorRunnerHandle
    where
        M: StockLevelMonitor,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);

        let bridge_trigger = trigger_tx.clone();
        let bridge_shutdown = shutdown_rx.clone();
        let bridge = tokio::task::spawn_blocking(move || {
            bridge_loop(name, subscription, bridge_trigger, bridge_shutdown)
        });

        let cfg = self.clone();
        let worker = tokio::spawn(worker_loop(name, cfg, trigger_rx, shutdown_rx, monitor));

        MonitorRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            bridge,
            worker,
        }
    }
}

/// Blocking side: drain the std-channel subscription into the trigger queue.
fn bridge_loop(
    name: &'static str,
    subscription: Subscription<LedgerEnvelope>,
    trigger: mpsc::Sender<()>,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() || trigger.is_closed() {
            break;
        }
        match subscription.recv_timeout(BRIDGE_POLL) {
            Ok(envelope) => {
                debug!(
                    runner = name,
                    event_type = envelope.event_type(),
                    sequence = envelope.sequence_number(),
                    "ledger event received"
                );
                // Full means a run is already pending.
                if let Err(mpsc::error::TrySendError::Closed(())) = trigger.try_send(()) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

async fn worker_loop<M>(
    name: &'static str,
    cfg: MonitorRunner,
    mut trigger: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
    monitor: Arc<M>,
) where
    M: StockLevelMonitor,
{
    info!(runner = name, "stock level monitor runner started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = trigger.recv() => {
                if next.is_none() {
                    break;
                }
                if !run_with_retry(name, &cfg, monitor.as_ref(), &mut shutdown).await {
                    break;
                }
            }
        }
    }

    info!(runner = name, "stock level monitor runner stopped");
}

/// Returns `false` if shutdown was requested mid-retry.
async fn run_with_retry<M>(
    name: &'static str,
    cfg: &MonitorRunner,
    monitor: &M,
    shutdown: &mut watch::Receiver<bool>,
) -> bool
where
    M: StockLevelMonitor,
{
    let mut failures: u32 = 0;
    loop {
        match monitor.notify_levels_changed().await {
            Ok(()) => return true,
            Err(e) => {
                failures += 1;
                if failures > cfg.max_retries {
                    warn!(runner = name, error = %e, failures, "stock level monitor failed; waiting for next trigger");
                    return true;
                }
                warn!(runner = name, error = %e, failures, "stock level monitor failed; retrying");
                tokio::select! {
                    _ = shutdown.changed() => return false,
                    _ = tokio::time::sleep(backoff(cfg.base_backoff, failures)) => {}
                }
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use stockledger_events::{EventBus, InMemoryEventBus};

    use crate::monitor::MonitorError;

    #[derive(Default)]
    struct CountingMonitor {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl StockLevelMonitor for CountingMonitor {
        async fn notify_levels_changed(&self) -> Result<(), MonitorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                return Err(MonitorError::Query("unavailable".to_string()));
            }
            Ok(())
        }
    }

    async fn wait_for(calls: &AtomicU32, at_least: u32) {
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff(base, 1), Duration::from_millis(250));
        assert_eq!(backoff(base, 3), Duration::from_millis(1000));
        assert_eq!(backoff(base, 12), Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_trigger_runs_the_monitor() {
        let bus = InMemoryEventBus::<LedgerEnvelope>::new();
        let monitor = Arc::new(CountingMonitor::default());
        let handle = MonitorRunner::default().spawn("test-monitor", bus.subscribe(), monitor.clone());

        handle.trigger();
        wait_for(&monitor.calls, 1).await;
        assert!(monitor.calls.load(Ordering::SeqCst) >= 1);

        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_are_retried() {
        let bus = InMemoryEventBus::<LedgerEnvelope>::new();
        let monitor = Arc::new(CountingMonitor {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let runner = MonitorRunner {
            max_retries: 5,
            base_backoff: Duration::from_millis(5),
        };
        let handle = runner.spawn("test-monitor", bus.subscribe(), monitor.clone());

        handle.trigger();
        wait_for(&monitor.calls, 3).await;
        assert_eq!(monitor.calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }
}
