//! `stockledger-core`: shared building blocks for the stock ledger.
//!
//! Identifiers, the domain error model and the optimistic-concurrency token.
//! No infrastructure concerns live here.

pub mod concurrency;
pub mod error;
pub mod id;

pub use concurrency::BalanceToken;
pub use error::{DomainError, DomainResult};
pub use id::{MovementId, ProductId, UserId};
