//! Movement Record Store and Product Balance Store.
//!
//! Both stores sit behind one backend so a balance change and its movement
//! record can be committed as a single unit ([`LedgerStore`]).

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub use in_memory::InMemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedgerStore;
pub use query::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MovementFilter, MovementPage, Pagination};
pub use r#trait::{BalanceStore, LedgerStore, MovementStore, StoreError};

/// Run a store call with an upper bound on how long it may take.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(StoreError::Timeout(operation.to_string()))
        }
    }
}
