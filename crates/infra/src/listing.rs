//! Query/Listing Facade: read-only, paginated movement history for display.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockledger_core::ProductId;
use stockledger_ledger::MovementRecord;

use crate::directory::Directory;
use crate::engine::LedgerError;
use crate::store::{MovementFilter, MovementStore, Pagination, bounded};

/// A movement record joined with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: MovementRecord,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl PageInfo {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementListing {
    pub movements: Vec<MovementView>,
    pub pagination: PageInfo,
    /// Sequence watermark; pass it back to keep later pages stable.
    pub as_of: u64,
}

pub struct MovementQueryService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    store_timeout: Duration,
}

impl<S, D> MovementQueryService<S, D>
where
    S: MovementStore,
    D: Directory,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, store_timeout: Duration) -> Self {
        Self {
            store,
            directory,
            store_timeout,
        }
    }

    /// One page of movements matching `filter`, newest first.
    ///
    /// Without `filter.as_of` the watermark is the latest committed sequence
    /// at the time of the call.
    #[instrument(skip(self, filter), err)]
    pub async fn list(
        &self,
        mut filter: MovementFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<MovementListing, LedgerError> {
        let as_of = match filter.as_of {
            Some(seq) => seq,
            None => {
                bounded(self.store_timeout, "latest_sequence", self.store.latest_sequence()).await?
            }
        };
        filter.as_of = Some(as_of);

        let (page, pagination) = Pagination::page(page, limit);
        let found = bounded(
            self.store_timeout,
            "list_movements",
            self.store.list_all(&filter, pagination),
        )
        .await?;

        Ok(MovementListing {
            movements: found.records.into_iter().map(|r| self.view(r)).collect(),
            pagination: PageInfo::new(page, pagination.limit, found.total),
            as_of,
        })
    }

    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: Option<u32>,
        limit: Option<u32>,
        as_of: Option<u64>,
    ) -> Result<MovementListing, LedgerError> {
        let filter = MovementFilter {
            as_of,
            ..MovementFilter::for_product(product_id)
        };
        self.list(filter, page, limit).await
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        Ok(bounded(self.store_timeout, "count_since", self.store.count_since(since)).await?)
    }

    fn view(&self, movement: MovementRecord) -> MovementView {
        let product = self.directory.product(movement.product_id).unwrap_or_default();
        let user = self.directory.user(movement.user_id).unwrap_or_default();
        MovementView {
            movement,
            product_name: product.name,
            product_sku: product.sku,
            user_name: user.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up() {
        assert_eq!(PageInfo::new(1, 2, 5).pages, 3);
        assert_eq!(PageInfo::new(1, 50, 0).pages, 0);
        assert_eq!(PageInfo::new(1, 50, 50).pages, 1);
    }
}
