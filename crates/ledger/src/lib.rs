//! Stock ledger domain module.
//!
//! Business rules for inventory movements, implemented as deterministic
//! domain logic (no IO, no HTTP, no storage). The infra crate loads a
//! balance, asks this crate what the next state is, and persists the answer.

pub mod audit;
pub mod balance;
pub mod event;
pub mod movement;
pub mod rules;

pub use audit::{AuditIssue, AuditReport, audit_chain};
pub use balance::{BalanceSeed, ProductBalance, StockStatus};
pub use event::{BalanceRegistered, LedgerEvent, MovementCommitted, ThresholdsUpdated};
pub use movement::{
    CostInput, Location, MovementCost, MovementDetails, MovementReason, MovementRecord,
    MovementRequest, MovementType, NewMovement, Quantity,
};
pub use rules::{Transition, next_stock, plan, replay};
