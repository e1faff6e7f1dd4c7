//! Optimistic concurrency token for product balances.

use serde::{Deserialize, Serialize};

/// What a writer observed when it read a balance.
///
/// A conditional write carrying this token succeeds only if the stored row
/// still holds the same stock *and* the same version. The version moves on
/// every commit, so a sequence of movements that lands back on the same stock
/// value is still detected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceToken {
    pub stock: i64,
    pub version: u64,
}

impl BalanceToken {
    pub fn new(stock: i64, version: u64) -> Self {
        Self { stock, version }
    }

    pub fn matches(self, stock: i64, version: u64) -> bool {
        self.stock == stock && self.version == version
    }
}
