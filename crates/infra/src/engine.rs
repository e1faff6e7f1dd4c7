//! Stock Ledger Engine.
//!
//! Applies one movement request to one product's balance:
//!
//! ```text
//! MovementRequest
//!   ↓
//! 1. Validate optional fields (no store access yet)
//!   ↓
//! 2. Read the balance and its concurrency token
//!   ↓
//! 3. Plan the transition (pure rules from the ledger crate)
//!   ↓
//! 4. commit_movement: compare-and-set + insert, as one unit
//!   ↓  (Conflict → back off, go to 2)
//! 5. Publish MovementCommitted (best-effort)
//! ```
//!
//! Every store call is bounded by `LedgerOptions::store_timeout`. A rejected
//! request leaves both stores exactly as they were.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use thiserror::Error;
use tracing::{Span, debug, field, info, instrument, warn};

use stockledger_core::{DomainError, MovementId, ProductId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_ledger::{
    AuditReport, BalanceRegistered, BalanceSeed, LedgerEvent, MovementCommitted, MovementRecord,
    MovementRequest, ProductBalance, ThresholdsUpdated, audit_chain, plan,
};

use crate::clock::{Clock, SystemClock};
use crate::store::{LedgerStore, StoreError, bounded};

/// Envelope type the engine publishes.
pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Extra attempts after the first one lost a compare-and-set race.
    pub max_conflict_retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            max_conflict_retries: 8,
            retry_backoff: Duration::from_millis(2),
            max_retry_backoff: Duration::from_millis(50),
        }
    }
}

impl LedgerOptions {
    fn backoff(&self, attempt: u32) -> Duration {
        let pow = 1u32 << attempt.saturating_sub(1).min(10);
        self.retry_backoff
            .saturating_mul(pow)
            .min(self.max_retry_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Deterministic rejection (validation, missing product, insufficient stock).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Every attempt lost the compare-and-set race.
    #[error("storage contention: gave up after {attempts} attempts")]
    StorageContention { attempts: u32 },

    #[error("storage timeout during {operation}")]
    StorageTimeout { operation: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageContention { .. }
                | LedgerError::StorageTimeout { .. }
                | LedgerError::Storage(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => DomainError::product_not_found(id).into(),
            StoreError::DuplicateProduct(id) => DomainError::DuplicateProduct(id.to_string()).into(),
            StoreError::Conflict(_) => LedgerError::StorageContention { attempts: 1 },
            StoreError::Timeout(operation) => LedgerError::StorageTimeout { operation },
            other @ (StoreError::DuplicateMovement(_) | StoreError::Backend(_)) => {
                LedgerError::Storage(other.to_string())
            }
        }
    }
}

/// A committed movement and the balance it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMovement {
    pub record: MovementRecord,
    pub balance: ProductBalance,
}

impl AppliedMovement {
    pub fn new_stock(&self) -> i64 {
        self.balance.current_stock
    }

    pub fn total_sold(&self) -> i64 {
        self.balance.total_sold
    }
}

/// The write side of the ledger.
///
/// - `S`: store backend (balances and movement records, committed together)
/// - `B`: bus the post-commit events go out on
pub struct StockLedger<S, B> {
    store: Arc<S>,
    bus: B,
    clock: Arc<dyn Clock>,
    options: LedgerOptions,
}

impl<S, B> StockLedger<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerEnvelope>,
{
    pub fn new(store: Arc<S>, bus: B) -> Self {
        Self {
            store,
            bus,
            clock: Arc::new(SystemClock),
            options: LedgerOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: LedgerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Apply one movement and return the committed record with the new balance.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            movement_type = %request.movement_type,
            quantity = request.quantity.get(),
            attempt = field::Empty
        ),
        err
    )]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedMovement, LedgerError> {
        let details = request.details()?;
        let limit = self.options.store_timeout;
        let span = Span::current();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            span.record("attempt", attempt);

            let current = bounded(limit, "get_balance", self.store.get(request.product_id)).await?;
            let now = next_timestamp(self.clock.now(), current.updated_at);
            let transition = plan(&current, &request, details.clone(), MovementId::new(), now)?;
            let balance = transition.balance.clone();

            let committed = bounded(
                limit,
                "commit_movement",
                self.store
                    .commit_movement(current.token(), transition.balance, transition.movement),
            )
            .await;

            match committed {
                Ok(record) => {
                    info!(
                        movement_id = %record.id,
                        sequence = record.sequence,
                        previous_stock = record.previous_stock,
                        new_stock = record.new_stock,
                        "movement committed"
                    );
                    self.publish(
                        record.sequence,
                        LedgerEvent::MovementCommitted(MovementCommitted {
                            movement_id: record.id,
                            product_id: record.product_id,
                            movement_type: record.movement_type,
                            quantity: record.quantity,
                            previous_stock: record.previous_stock,
                            new_stock: record.new_stock,
                            occurred_at: record.timestamp,
                        }),
                    );
                    return Ok(AppliedMovement { record, balance });
                }
                Err(StoreError::Conflict(_)) if attempt <= self.options.max_conflict_retries => {
                    debug!(attempt, "balance changed underneath; retrying from a fresh read");
                    tokio::time::sleep(self.options.backoff(attempt)).await;
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(attempts = attempt, "giving up after repeated conflicts");
                    return Err(LedgerError::StorageContention { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Enter a product into the ledger with its seed stock and thresholds.
    #[instrument(skip(self, seed), fields(product_id = %seed.product_id), err)]
    pub async fn register_product(
        &self,
        seed: BalanceSeed,
        user_id: Option<UserId>,
    ) -> Result<ProductBalance, LedgerError> {
        let balance = ProductBalance::register(&seed, user_id, self.clock.now().trunc_subsecs(6))?;
        bounded(
            self.options.store_timeout,
            "create_balance",
            self.store.create(balance.clone()),
        )
        .await?;

        info!(initial_stock = balance.current_stock, "product registered");
        self.publish(
            balance.version,
            LedgerEvent::BalanceRegistered(BalanceRegistered {
                product_id: balance.product_id,
                initial_stock: balance.current_stock,
                occurred_at: balance.updated_at,
            }),
        );
        Ok(balance)
    }

    /// Change a product's thresholds; stock is untouched and no movement is recorded.
    #[instrument(skip(self), fields(attempt = field::Empty), err)]
    pub async fn update_thresholds(
        &self,
        product_id: ProductId,
        minimum_stock: i64,
        maximum_stock: i64,
        user_id: Option<UserId>,
    ) -> Result<ProductBalance, LedgerError> {
        let limit = self.options.store_timeout;
        let span = Span::current();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            span.record("attempt", attempt);

            let current = bounded(limit, "get_balance", self.store.get(product_id)).await?;
            let now = next_timestamp(self.clock.now(), current.updated_at);
            let next = current.with_thresholds(minimum_stock, maximum_stock, user_id, now)?;

            match bounded(
                limit,
                "compare_and_set",
                self.store.compare_and_set(current.token(), next.clone()),
            )
            .await
            {
                Ok(()) => {
                    info!(minimum_stock, maximum_stock, "thresholds updated");
                    self.publish(
                        next.version,
                        LedgerEvent::ThresholdsUpdated(ThresholdsUpdated {
                            product_id,
                            minimum_stock,
                            maximum_stock,
                            occurred_at: now,
                        }),
                    );
                    return Ok(next);
                }
                Err(StoreError::Conflict(_)) if attempt <= self.options.max_conflict_retries => {
                    debug!(attempt, "balance changed underneath; retrying threshold update");
                    tokio::time::sleep(self.options.backoff(attempt)).await;
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(attempts = attempt, "giving up after repeated conflicts");
                    return Err(LedgerError::StorageContention { attempts: attempt });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn balance(&self, product_id: ProductId) -> Result<ProductBalance, LedgerError> {
        Ok(bounded(self.options.store_timeout, "get_balance", self.store.get(product_id)).await?)
    }

    /// Replay a product's history against its stored balance. Read-only.
    ///
    /// The balance is read before and after the history; a version change in
    /// between means a commit raced the read, and the snapshot is retaken.
    #[instrument(skip(self), err)]
    pub async fn audit(&self, product_id: ProductId) -> Result<AuditReport, LedgerError> {
        let limit = self.options.store_timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let before = bounded(limit, "get_balance", self.store.get(product_id)).await?;
            let history = bounded(limit, "history", self.store.history(product_id)).await?;
            let after = bounded(limit, "get_balance", self.store.get(product_id)).await?;

            if before.version == after.version {
                let report = audit_chain(&after, &history);
                if !report.consistent {
                    warn!(issues = report.issues.len(), "ledger audit found inconsistencies");
                }
                return Ok(report);
            }
            if attempt > self.options.max_conflict_retries {
                return Err(LedgerError::StorageContention { attempts: attempt });
            }
            tokio::time::sleep(self.options.backoff(attempt)).await;
        }
    }

    fn publish(&self, sequence: u64, event: LedgerEvent) {
        let envelope = EventEnvelope::new(event.product_id(), sequence, event);
        if let Err(e) = self.bus.publish(envelope) {
            warn!(error = ?e, "failed to publish ledger event; commit stands");
        }
    }
}

/// Stamp for a change that follows one stamped `previous`.
///
/// Whole microseconds (the Postgres `TIMESTAMPTZ` resolution), and strictly
/// after `previous` even when the clock stalls or steps back.
fn next_timestamp(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous.trunc_subsecs(6) + chrono::Duration::microseconds(1);
    now.trunc_subsecs(6).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let options = LedgerOptions::default();
        assert_eq!(options.backoff(1), Duration::from_millis(2));
        assert_eq!(options.backoff(2), Duration::from_millis(4));
        assert_eq!(options.backoff(5), Duration::from_millis(32));
        assert_eq!(options.backoff(6), Duration::from_millis(50));
        assert_eq!(options.backoff(30), Duration::from_millis(50));
    }

    #[test]
    fn timestamps_are_whole_micros_and_strictly_after_previous() {
        let previous = Utc::now().trunc_subsecs(6);

        let later = previous + chrono::Duration::nanoseconds(2_500_999);
        assert_eq!(next_timestamp(later, previous), previous + chrono::Duration::microseconds(2_500));

        for now in [previous, previous - chrono::Duration::seconds(5), previous + chrono::Duration::nanoseconds(400)] {
            assert_eq!(next_timestamp(now, previous), previous + chrono::Duration::microseconds(1));
        }
    }

    #[test]
    fn store_errors_map_to_ledger_errors() {
        let id = ProductId::new();
        assert!(matches!(
            LedgerError::from(StoreError::NotFound(id)),
            LedgerError::Domain(DomainError::ProductNotFound(_))
        ));
        assert!(matches!(
            LedgerError::from(StoreError::DuplicateProduct(id)),
            LedgerError::Domain(DomainError::DuplicateProduct(_))
        ));
        assert_eq!(
            LedgerError::from(StoreError::Timeout("get_balance".to_string())),
            LedgerError::StorageTimeout {
                operation: "get_balance".to_string()
            }
        );
        assert!(LedgerError::from(StoreError::Backend("io".to_string())).is_retryable());
        assert!(!LedgerError::from(StoreError::NotFound(id)).is_retryable());
    }
}
