//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (bad input, missing product, rule
/// violations). Storage and timeout failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. missing field, over-long notes).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The movement type tag is outside the closed set.
    #[error("invalid movement type: {0:?}")]
    InvalidMovementType(String),

    /// Quantity was zero, negative or not an integer.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The product has no balance registered with the ledger.
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// A balance is already registered for the product.
    #[error("product already registered: {0}")]
    DuplicateProduct(String),

    /// A stock-out asked for more than the current balance.
    #[error("insufficient stock (available: {available}, requested: {requested})")]
    InsufficientStock { available: i64, requested: i64 },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn product_not_found(id: impl core::fmt::Display) -> Self {
        Self::ProductNotFound(id.to_string())
    }
}
