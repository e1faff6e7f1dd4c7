//! Transition rules: how each movement type moves a balance.

use chrono::{DateTime, Utc};

use stockledger_core::{DomainError, DomainResult, MovementId};

use crate::balance::ProductBalance;
use crate::movement::{MovementDetails, MovementRequest, MovementType, NewMovement, Quantity};

/// The outcome of planning a movement against an observed balance.
///
/// Both halves must be committed together: the store writes `balance` only
/// if the row still matches the token the plan was computed from, and
/// inserts `movement` in the same unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub balance: ProductBalance,
    pub movement: NewMovement,
}

/// New stock level for `movement_type` applied to `previous`.
///
/// | type       | new stock           | fails when              |
/// |------------|---------------------|-------------------------|
/// | stock-in   | previous + q        | the sum overflows       |
/// | stock-out  | previous - q        | q > previous            |
/// | adjustment | q                   | never                   |
/// | transfer   | max(0, previous - q)| never                   |
pub fn next_stock(movement_type: MovementType, previous: i64, quantity: Quantity) -> DomainResult<i64> {
    let q = quantity.get();
    match movement_type {
        MovementType::StockIn => previous
            .checked_add(q)
            .ok_or_else(|| DomainError::validation("stock level would overflow")),
        MovementType::StockOut => {
            if q > previous {
                return Err(DomainError::InsufficientStock {
                    available: previous,
                    requested: q,
                });
            }
            Ok(previous - q)
        }
        MovementType::Adjustment => Ok(q),
        // Outgoing leg only; the receiving product records its own stock-in.
        MovementType::Transfer => Ok((previous - q).max(0)),
    }
}

/// Decide the next balance and the record for `request` against `current`.
///
/// Pure: the caller supplies the id and the clock reading.
pub fn plan(
    current: &ProductBalance,
    request: &MovementRequest,
    details: MovementDetails,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> DomainResult<Transition> {
    if current.product_id != request.product_id {
        return Err(DomainError::invariant("product_id mismatch"));
    }

    let previous = current.current_stock;
    let new_stock = next_stock(request.movement_type, previous, request.quantity)?;
    let quantity = request.quantity.get();

    let mut balance = current.clone();
    balance.current_stock = new_stock;
    balance.updated_at = now;
    balance.updated_by = Some(request.user_id);
    balance.version = current.version + 1;

    match request.movement_type {
        MovementType::StockIn => {
            balance.last_restocked = Some(now);
        }
        MovementType::StockOut => {
            balance.total_sold = current
                .total_sold
                .checked_add(quantity)
                .ok_or_else(|| DomainError::validation("total sold would overflow"))?;
            balance.last_sold = Some(now);
        }
        MovementType::Adjustment | MovementType::Transfer => {}
    }

    let movement = NewMovement {
        id: movement_id,
        product_id: request.product_id,
        movement_type: request.movement_type,
        quantity,
        previous_stock: previous,
        new_stock,
        details,
        user_id: request.user_id,
        timestamp: now,
    };

    Ok(Transition { balance, movement })
}

/// Fold the transition rule over `movements`, starting from `start`.
pub fn replay<I>(start: i64, movements: I) -> DomainResult<i64>
where
    I: IntoIterator<Item = (MovementType, Quantity)>,
{
    movements
        .into_iter()
        .try_fold(start, |stock, (t, q)| next_stock(t, stock, q))
}
