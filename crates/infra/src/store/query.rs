//! Filter and pagination types for movement listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, UserId};
use stockledger_ledger::{MovementReason, MovementRecord, MovementType};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Translate a 1-based page number into an offset.
    ///
    /// Returns the effective page alongside the pagination.
    pub fn page(page: Option<u32>, limit: Option<u32>) -> (u32, Self) {
        let page = page.unwrap_or(1).max(1);
        let limit = clamp_limit(limit);
        let offset = (page - 1).saturating_mul(limit);
        (page, Self { limit, offset })
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Conjunctive filter over movement records. `None` fields impose nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
    pub reason: Option<MovementReason>,
    pub user_id: Option<UserId>,
    /// Inclusive lower bound on the record timestamp.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the record timestamp.
    pub date_to: Option<DateTime<Utc>>,
    /// Sequence watermark: records committed after it are excluded.
    pub as_of: Option<u64>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &MovementRecord) -> bool {
        self.product_id.is_none_or(|p| p == record.product_id)
            && self.movement_type.is_none_or(|t| t == record.movement_type)
            && self.reason.is_none_or(|r| record.details.reason == Some(r))
            && self.user_id.is_none_or(|u| u == record.user_id)
            && self.date_from.is_none_or(|from| record.timestamp >= from)
            && self.date_to.is_none_or(|to| record.timestamp <= to)
            && self.as_of.is_none_or(|seq| record.sequence <= seq)
    }
}

/// One page of records plus the total matching the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub records: Vec<MovementRecord>,
    pub total: u64,
}
