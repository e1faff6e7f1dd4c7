use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_core::{BalanceToken, MovementId, ProductId};
use stockledger_ledger::{MovementRecord, NewMovement, ProductBalance};

use super::query::{MovementFilter, MovementPage, Pagination};

/// Store operation error.
///
/// These are **infrastructure errors** (concurrency, missing rows, IO) as
/// opposed to the ledger's domain errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The balance no longer matches the token the writer observed.
    #[error("concurrent update detected for product {0}")]
    Conflict(ProductId),

    #[error("no balance registered for product {0}")]
    NotFound(ProductId),

    #[error("a balance is already registered for product {0}")]
    DuplicateProduct(ProductId),

    #[error("movement {0} already exists")]
    DuplicateMovement(MovementId),

    /// The operation did not finish within its bound.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// Anything else the backend reported (IO, pool, decoding).
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Append-only persistence of movement records.
///
/// The store assigns every record a `sequence` at commit time. Sequences are
/// strictly increasing across all products and double as the commit order.
#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Records matching `filter`, newest first, plus the total across pages.
    async fn list_all(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    /// One product's records, newest first.
    async fn list_by_product(
        &self,
        product_id: ProductId,
        pagination: Pagination,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let filter = MovementFilter::for_product(product_id);
        Ok(self.list_all(&filter, pagination).await?.records)
    }

    /// A product's full history in commit order (oldest first).
    async fn history(&self, product_id: ProductId) -> Result<Vec<MovementRecord>, StoreError>;

    /// Number of records with `timestamp >= since`.
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Highest committed sequence, 0 when the store is empty.
    async fn latest_sequence(&self) -> Result<u64, StoreError>;
}

/// The single current-balance row per product.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get(&self, product_id: ProductId) -> Result<ProductBalance, StoreError>;

    /// Insert the first row for a product; `DuplicateProduct` if one exists.
    async fn create(&self, balance: ProductBalance) -> Result<(), StoreError>;

    /// Replace the row only if it still matches `expected`.
    async fn compare_and_set(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
    ) -> Result<(), StoreError>;

    /// Balances whose stock status is anything but in-stock.
    async fn needing_attention(&self) -> Result<Vec<ProductBalance>, StoreError>;
}

/// A backend that can commit a balance change and its movement record as
/// one unit.
#[async_trait]
pub trait LedgerStore: MovementStore + BalanceStore {
    /// Compare-and-set the balance and insert the movement, atomically.
    ///
    /// On any error neither write is visible.
    async fn commit_movement(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError>;
}
