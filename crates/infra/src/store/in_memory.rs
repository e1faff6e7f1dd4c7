use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockledger_core::{BalanceToken, MovementId, ProductId};
use stockledger_ledger::{MovementRecord, NewMovement, ProductBalance};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{BalanceStore, LedgerStore, MovementStore, StoreError};

#[derive(Debug, Default)]
struct State {
    balances: HashMap<ProductId, ProductBalance>,
    /// Commit order; index i holds sequence i + 1.
    movements: Vec<MovementRecord>,
    movement_ids: HashSet<MovementId>,
}

impl State {
    fn append(&mut self, movement: NewMovement) -> MovementRecord {
        let sequence = self.movements.len() as u64 + 1;
        let record = movement.into_record(sequence);
        self.movement_ids.insert(record.id);
        self.movements.push(record.clone());
        record
    }
}

/// In-memory balances and movement records behind one lock.
///
/// Intended for tests/dev. The commit critical section covers both the
/// balance row and the record list, so the pair is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with no balance change, to stage a colliding id.
    #[cfg(test)]
    fn insert_unpaired(&self, movement: NewMovement) -> Result<MovementRecord, StoreError> {
        let mut state = self.write()?;
        if state.movement_ids.contains(&movement.id) {
            return Err(StoreError::DuplicateMovement(movement.id));
        }
        Ok(state.append(movement))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl MovementStore for InMemoryLedgerStore {
    async fn list_all(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&MovementRecord> =
            state.movements.iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(MovementPage { records, total })
    }

    async fn history(&self, product_id: ProductId) -> Result<Vec<MovementRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .movements
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.read()?;
        Ok(state.movements.iter().filter(|r| r.timestamp >= since).count() as u64)
    }

    async fn latest_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.movements.len() as u64)
    }
}

#[async_trait]
impl BalanceStore for InMemoryLedgerStore {
    async fn get(&self, product_id: ProductId) -> Result<ProductBalance, StoreError> {
        self.read()?
            .balances
            .get(&product_id)
            .cloned()
            .ok_or(StoreError::NotFound(product_id))
    }

    async fn create(&self, balance: ProductBalance) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.balances.contains_key(&balance.product_id) {
            return Err(StoreError::DuplicateProduct(balance.product_id));
        }
        state.balances.insert(balance.product_id, balance);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let row = state
            .balances
            .get_mut(&balance.product_id)
            .ok_or(StoreError::NotFound(balance.product_id))?;
        if !expected.matches(row.current_stock, row.version) {
            return Err(StoreError::Conflict(balance.product_id));
        }
        *row = balance;
        Ok(())
    }

    async fn needing_attention(&self) -> Result<Vec<ProductBalance>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<ProductBalance> = state
            .balances
            .values()
            .filter(|b| b.status().needs_attention())
            .cloned()
            .collect();
        out.sort_by_key(|b| b.product_id);
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn commit_movement(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError> {
        if balance.product_id != movement.product_id {
            return Err(StoreError::Backend(
                "balance and movement target different products".to_string(),
            ));
        }

        let mut state = self.write()?;

        // Every check runs before the first write.
        let row = state
            .balances
            .get(&balance.product_id)
            .ok_or(StoreError::NotFound(balance.product_id))?;
        if !expected.matches(row.current_stock, row.version) {
            return Err(StoreError::Conflict(balance.product_id));
        }
        if state.movement_ids.contains(&movement.id) {
            return Err(StoreError::DuplicateMovement(movement.id));
        }

        state.balances.insert(balance.product_id, balance);
        Ok(state.append(movement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::UserId;
    use stockledger_ledger::{
        BalanceSeed, MovementDetails, MovementRequest, MovementType, Quantity, plan,
    };

    async fn seeded(store: &InMemoryLedgerStore, stock: i64) -> ProductBalance {
        let seed = BalanceSeed::new(ProductId::new()).with_initial_stock(stock);
        let balance = ProductBalance::register(&seed, None, Utc::now()).unwrap();
        store.create(balance.clone()).await.unwrap();
        balance
    }

    fn stock_in(balance: &ProductBalance, q: i64) -> stockledger_ledger::Transition {
        let req = MovementRequest::new(
            balance.product_id,
            MovementType::StockIn,
            Quantity::new(q).unwrap(),
            UserId::new(),
        );
        plan(balance, &req, MovementDetails::default(), MovementId::new(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryLedgerStore::new();
        let b = seeded(&store, 1).await;
        assert_eq!(
            store.create(b.clone()).await,
            Err(StoreError::DuplicateProduct(b.product_id))
        );
    }

    #[tokio::test]
    async fn commit_assigns_increasing_sequences() {
        let store = InMemoryLedgerStore::new();
        let b = seeded(&store, 0).await;

        let t1 = stock_in(&b, 5);
        let r1 = store
            .commit_movement(b.token(), t1.balance.clone(), t1.movement)
            .await
            .unwrap();
        let t2 = stock_in(&t1.balance, 5);
        let r2 = store
            .commit_movement(t1.balance.token(), t2.balance, t2.movement)
            .await
            .unwrap();

        assert_eq!((r1.sequence, r2.sequence), (1, 2));
        assert_eq!(store.latest_sequence().await.unwrap(), 2);
        assert_eq!(store.get(b.product_id).await.unwrap().current_stock, 10);
    }

    #[tokio::test]
    async fn stale_token_is_a_conflict_and_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let b = seeded(&store, 0).await;
        let t = stock_in(&b, 5);
        store
            .commit_movement(b.token(), t.balance.clone(), t.movement)
            .await
            .unwrap();

        let stale = stock_in(&b, 7);
        let err = store
            .commit_movement(b.token(), stale.balance, stale.movement)
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::Conflict(b.product_id));
        assert_eq!(store.get(b.product_id).await.unwrap().current_stock, 5);
        assert_eq!(store.history(b.product_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_movement_id_leaves_balance_untouched() {
        let store = InMemoryLedgerStore::new();
        let b = seeded(&store, 0).await;
        let t = stock_in(&b, 5);
        let existing = store.insert_unpaired(t.movement.clone()).unwrap();

        let err = store
            .commit_movement(b.token(), t.balance, t.movement)
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::DuplicateMovement(existing.id));
        assert_eq!(store.get(b.product_id).await.unwrap().current_stock, 0);
        assert_eq!(store.get(b.product_id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn list_by_product_is_newest_first() {
        let store = InMemoryLedgerStore::new();
        let mut b = seeded(&store, 0).await;
        let other = seeded(&store, 0).await;

        for _ in 0..3 {
            let t = stock_in(&b, 1);
            store
                .commit_movement(b.token(), t.balance.clone(), t.movement)
                .await
                .unwrap();
            b = t.balance;
        }
        let t = stock_in(&other, 1);
        store
            .commit_movement(other.token(), t.balance, t.movement)
            .await
            .unwrap();

        let records = store
            .list_by_product(b.product_id, Pagination::default())
            .await
            .unwrap();
        let stocks: Vec<i64> = records.iter().map(|r| r.new_stock).collect();
        assert_eq!(stocks, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn needing_attention_lists_only_flagged_balances() {
        let store = InMemoryLedgerStore::new();
        let empty = seeded(&store, 0).await;
        seeded(&store, 500).await;

        let flagged = store.needing_attention().await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].product_id, empty.product_id);
    }
}
