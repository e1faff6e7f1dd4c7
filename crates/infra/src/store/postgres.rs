//! Postgres-backed balance and movement store.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError | Scenario |
//! |------------|------------|----------|
//! | `PoolTimedOut` | `Timeout` | no connection within the acquire timeout |
//! | Database `23505` on `product_balances` | `DuplicateProduct` | product registered twice |
//! | Database `23505` on `stock_movements` | `DuplicateMovement` | movement id reused |
//! | anything else | `Backend` | IO, decoding, constraint failures |
//!
//! A conditional update that matches zero rows is reported as `Conflict`; the
//! engine's next read tells a vanished row apart from a concurrent writer.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{BalanceToken, MovementId, ProductId, UserId};
use stockledger_ledger::{
    Location, MovementCost, MovementDetails, MovementReason, MovementRecord, MovementType,
    NewMovement, ProductBalance,
};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{BalanceStore, LedgerStore, MovementStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const MOVEMENT_COLUMNS: &str = "sequence, movement_id, product_id, movement_type, quantity, \
     previous_stock, new_stock, reason, reference, notes, location, batch_number, \
     serial_numbers, cost, user_id, occurred_at";

const BALANCE_COLUMNS: &str = "product_id, current_stock, minimum_stock, maximum_stock, \
     total_sold, last_restocked, last_sold, updated_at, updated_by, version";

/// Postgres-backed ledger store.
///
/// `PgPool` is internally reference counted, so clones share connections.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl MovementStore for PostgresLedgerStore {
    #[instrument(skip(self, movement), fields(movement_id = %movement.id), err)]
    async fn list_all(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM stock_movements");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements"
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY occurred_at DESC, sequence DESC LIMIT ")
            .push_bind(i64::from(pagination.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        let records = rows.iter().map(record_from_row).collect::<Result<_, _>>()?;
        Ok(MovementPage {
            records,
            total: total.max(0) as u64,
        })
    }

    async fn history(&self, product_id: ProductId) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = $1 ORDER BY sequence ASC"
        ))
        .bind(*product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE occurred_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_since", e))?;
        Ok(n.max(0) as u64)
    }

    async fn latest_sequence(&self) -> Result<u64, StoreError> {
        let n: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence) FROM stock_movements")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_sequence", e))?;
        Ok(n.unwrap_or(0).max(0) as u64)
    }
}

#[async_trait]
impl BalanceStore for PostgresLedgerStore {
    async fn get(&self, product_id: ProductId) -> Result<ProductBalance, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM product_balances WHERE product_id = $1"
        ))
        .bind(*product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_balance", e))?;

        match row {
            Some(row) => balance_from_row(&row),
            None => Err(StoreError::NotFound(product_id)),
        }
    }

    #[instrument(skip(self, balance), fields(product_id = %balance.product_id), err)]
    async fn create(&self, balance: ProductBalance) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO product_balances ({BALANCE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(*balance.product_id.as_uuid())
        .bind(balance.current_stock)
        .bind(balance.minimum_stock)
        .bind(balance.maximum_stock)
        .bind(balance.total_sold)
        .bind(balance.last_restocked)
        .bind(balance.last_sold)
        .bind(balance.updated_at)
        .bind(balance.updated_by.map(|u| *u.as_uuid()))
        .bind(version_to_db(balance.version)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateProduct(balance.product_id)),
            Err(e) => Err(map_sqlx_error("create_balance", e)),
        }
    }

    async fn compare_and_set(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
    ) -> Result<(), StoreError> {
        let updated = update_balance(&self.pool, expected, &balance)
            .await
            .map_err(|e| map_sqlx_error("compare_and_set", e))?;
        if updated == 0 {
            return Err(StoreError::Conflict(balance.product_id));
        }
        Ok(())
    }

    async fn needing_attention(&self) -> Result<Vec<ProductBalance>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM product_balances \
             WHERE current_stock <= minimum_stock OR current_stock > maximum_stock \
             ORDER BY product_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("needing_attention", e))?;

        rows.iter().map(balance_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(
        skip(self, balance, movement),
        fields(
            product_id = %balance.product_id,
            movement_id = %movement.id,
            expected_version = expected.version
        ),
        err
    )]
    async fn commit_movement(
        &self,
        expected: BalanceToken,
        balance: ProductBalance,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = update_balance(&mut *tx, expected, &balance)
            .await
            .map_err(|e| map_sqlx_error("commit_balance", e))?;
        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(balance.product_id));
        }

        // Dropping `tx` on the error path rolls the balance update back.
        let sequence = insert_movement(&mut *tx, &movement)
            .await
            .map_err(|e| movement_insert_error(movement.id, e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(movement.into_record(sequence))
    }
}

async fn update_balance<'e, E>(
    executor: E,
    expected: BalanceToken,
    balance: &ProductBalance,
) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let expected_version = i64::try_from(expected.version)
        .map_err(|_| sqlx::Error::Protocol("version out of range".to_string()))?;
    let next_version = i64::try_from(balance.version)
        .map_err(|_| sqlx::Error::Protocol("version out of range".to_string()))?;

    let result = sqlx::query(
        r#"
        UPDATE product_balances SET
            current_stock = $4,
            minimum_stock = $5,
            maximum_stock = $6,
            total_sold = $7,
            last_restocked = $8,
            last_sold = $9,
            updated_at = $10,
            updated_by = $11,
            version = $12
        WHERE product_id = $1 AND current_stock = $2 AND version = $3
        "#,
    )
    .bind(*balance.product_id.as_uuid())
    .bind(expected.stock)
    .bind(expected_version)
    .bind(balance.current_stock)
    .bind(balance.minimum_stock)
    .bind(balance.maximum_stock)
    .bind(balance.total_sold)
    .bind(balance.last_restocked)
    .bind(balance.last_sold)
    .bind(balance.updated_at)
    .bind(balance.updated_by.map(|u| *u.as_uuid()))
    .bind(next_version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_movement<'e, E>(executor: E, movement: &NewMovement) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let d = &movement.details;
    let location = to_json(&d.location)?;
    let cost = to_json(&d.cost)?;
    let serials = serde_json::to_value(&d.serial_numbers).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stock_movements (
            movement_id, product_id, movement_type, quantity, previous_stock, new_stock,
            reason, reference, notes, location, batch_number, serial_numbers, cost,
            user_id, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING sequence
        "#,
    )
    .bind(*movement.id.as_uuid())
    .bind(*movement.product_id.as_uuid())
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.previous_stock)
    .bind(movement.new_stock)
    .bind(d.reason.map(|r| r.as_str()))
    .bind(d.reference.clone())
    .bind(d.notes.clone())
    .bind(location)
    .bind(d.batch_number.clone())
    .bind(serials)
    .bind(cost)
    .bind(*movement.user_id.as_uuid())
    .bind(movement.timestamp)
    .fetch_one(executor)
    .await?;

    Ok(sequence.max(0) as u64)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &MovementFilter) {
    qb.push(" WHERE TRUE");
    if let Some(p) = filter.product_id {
        qb.push(" AND product_id = ").push_bind(*p.as_uuid());
    }
    if let Some(t) = filter.movement_type {
        qb.push(" AND movement_type = ").push_bind(t.as_str());
    }
    if let Some(r) = filter.reason {
        qb.push(" AND reason = ").push_bind(r.as_str());
    }
    if let Some(u) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(*u.as_uuid());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND occurred_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND occurred_at <= ").push_bind(to);
    }
    if let Some(seq) = filter.as_of {
        qb.push(" AND sequence <= ")
            .push_bind(i64::try_from(seq).unwrap_or(i64::MAX));
    }
}

fn record_from_row(row: &PgRow) -> Result<MovementRecord, StoreError> {
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let movement_type: String = row.try_get("movement_type").map_err(decode_error)?;
    let reason: Option<String> = row.try_get("reason").map_err(decode_error)?;
    let location: Option<JsonValue> = row.try_get("location").map_err(decode_error)?;
    let serials: JsonValue = row.try_get("serial_numbers").map_err(decode_error)?;
    let cost: Option<JsonValue> = row.try_get("cost").map_err(decode_error)?;

    let details = MovementDetails {
        reason: reason
            .as_deref()
            .map(MovementReason::from_str)
            .transpose()
            .map_err(|e| StoreError::Backend(format!("stored reason: {e}")))?,
        reference: row.try_get("reference").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
        location: from_json::<Location>(location)?,
        batch_number: row.try_get("batch_number").map_err(decode_error)?,
        serial_numbers: serde_json::from_value(serials).map_err(json_error)?,
        cost: from_json::<MovementCost>(cost)?,
    };

    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get::<Uuid, _>("movement_id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id").map_err(decode_error)?),
        movement_type: MovementType::from_str(&movement_type)
            .map_err(|e| StoreError::Backend(format!("stored movement type: {e}")))?,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        previous_stock: row.try_get("previous_stock").map_err(decode_error)?,
        new_stock: row.try_get("new_stock").map_err(decode_error)?,
        details,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(decode_error)?),
        timestamp: row.try_get("occurred_at").map_err(decode_error)?,
        sequence: sequence.max(0) as u64,
    })
}

fn balance_from_row(row: &PgRow) -> Result<ProductBalance, StoreError> {
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let updated_by: Option<Uuid> = row.try_get("updated_by").map_err(decode_error)?;

    Ok(ProductBalance {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id").map_err(decode_error)?),
        current_stock: row.try_get("current_stock").map_err(decode_error)?,
        minimum_stock: row.try_get("minimum_stock").map_err(decode_error)?,
        maximum_stock: row.try_get("maximum_stock").map_err(decode_error)?,
        total_sold: row.try_get("total_sold").map_err(decode_error)?,
        last_restocked: row.try_get("last_restocked").map_err(decode_error)?,
        last_sold: row.try_get("last_sold").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
        updated_by: updated_by.map(UserId::from_uuid),
        version: version.max(0) as u64,
    })
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Backend("version out of range".to_string()))
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<JsonValue>, sqlx::Error> {
    value
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: Option<JsonValue>) -> Result<Option<T>, StoreError> {
    value.map(serde_json::from_value).transpose().map_err(json_error)
}

fn decode_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {e}"))
}

fn json_error(e: serde_json::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode json column: {e}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn movement_insert_error(id: MovementId, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::DuplicateMovement(id)
    } else {
        map_sqlx_error("insert_movement", err)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(operation.to_string()),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
