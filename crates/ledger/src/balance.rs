use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BalanceToken, DomainError, DomainResult, ProductId, UserId};

pub const DEFAULT_MINIMUM_STOCK: i64 = 10;
pub const DEFAULT_MAXIMUM_STOCK: i64 = 1000;

/// Current stock of one product plus the bookkeeping the ledger owns.
///
/// A materialised projection of the product's movement records. Mutated only
/// by committing a movement (or, for the thresholds, by `with_thresholds`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBalance {
    pub product_id: ProductId,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub total_sold: i64,
    pub last_restocked: Option<DateTime<Utc>>,
    pub last_sold: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<UserId>,
    /// Concurrency version; +1 per committed change.
    pub version: u64,
}

/// Initial values for a product entering the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSeed {
    pub product_id: ProductId,
    pub initial_stock: i64,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
}

impl BalanceSeed {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            initial_stock: 0,
            minimum_stock: DEFAULT_MINIMUM_STOCK,
            maximum_stock: DEFAULT_MAXIMUM_STOCK,
        }
    }

    pub fn with_initial_stock(mut self, stock: i64) -> Self {
        self.initial_stock = stock;
        self
    }

    pub fn with_thresholds(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum_stock = minimum;
        self.maximum_stock = maximum;
        self
    }
}

/// Where a balance sits relative to its thresholds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    Overstocked,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Overstocked => "overstocked",
        }
    }

    pub fn needs_attention(&self) -> bool {
        !matches!(self, StockStatus::InStock)
    }
}

impl ProductBalance {
    /// Build the first balance row for a product.
    pub fn register(seed: &BalanceSeed, user_id: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        if seed.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        validate_thresholds(seed.minimum_stock, seed.maximum_stock)?;

        Ok(Self {
            product_id: seed.product_id,
            current_stock: seed.initial_stock,
            minimum_stock: seed.minimum_stock,
            maximum_stock: seed.maximum_stock,
            total_sold: 0,
            last_restocked: None,
            last_sold: None,
            updated_at: now,
            updated_by: user_id,
            version: 0,
        })
    }

    pub fn token(&self) -> BalanceToken {
        BalanceToken::new(self.current_stock, self.version)
    }

    pub fn status(&self) -> StockStatus {
        if self.current_stock == 0 {
            StockStatus::OutOfStock
        } else if self.current_stock <= self.minimum_stock {
            StockStatus::LowStock
        } else if self.current_stock > self.maximum_stock {
            StockStatus::Overstocked
        } else {
            StockStatus::InStock
        }
    }

    /// Next version of this balance with new thresholds; stock is untouched.
    pub fn with_thresholds(
        &self,
        minimum: i64,
        maximum: i64,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_thresholds(minimum, maximum)?;
        Ok(Self {
            minimum_stock: minimum,
            maximum_stock: maximum,
            updated_at: now,
            updated_by: user_id.or(self.updated_by),
            version: self.version + 1,
            ..self.clone()
        })
    }
}

fn validate_thresholds(minimum: i64, maximum: i64) -> DomainResult<()> {
    if minimum < 0 {
        return Err(DomainError::validation("minimum stock cannot be negative"));
    }
    if maximum < 1 {
        return Err(DomainError::validation("maximum stock must be at least 1"));
    }
    if minimum >= maximum {
        return Err(DomainError::validation(
            "minimum stock must be less than maximum stock",
        ));
    }
    Ok(())
}
