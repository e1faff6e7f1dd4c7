use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{MovementId, ProductId};
use stockledger_events::Event;

use crate::movement::MovementType;

/// Event: MovementCommitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementCommitted {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BalanceRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRegistered {
    pub product_id: ProductId,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ThresholdsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsUpdated {
    pub product_id: ProductId,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Everything the ledger announces after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    MovementCommitted(MovementCommitted),
    BalanceRegistered(BalanceRegistered),
    ThresholdsUpdated(ThresholdsUpdated),
}

impl LedgerEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            LedgerEvent::MovementCommitted(e) => e.product_id,
            LedgerEvent::BalanceRegistered(e) => e.product_id,
            LedgerEvent::ThresholdsUpdated(e) => e.product_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementCommitted(_) => "ledger.movement.committed",
            LedgerEvent::BalanceRegistered(_) => "ledger.balance.registered",
            LedgerEvent::ThresholdsUpdated(_) => "ledger.balance.thresholds_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementCommitted(e) => e.occurred_at,
            LedgerEvent::BalanceRegistered(e) => e.occurred_at,
            LedgerEvent::ThresholdsUpdated(e) => e.occurred_at,
        }
    }
}
