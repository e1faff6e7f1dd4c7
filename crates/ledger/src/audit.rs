//! Replay a product's movement history against its balance.

use serde::{Deserialize, Serialize};

use stockledger_core::ProductId;

use crate::balance::ProductBalance;
use crate::movement::{MovementRecord, Quantity};
use crate::rules::next_stock;

/// One inconsistency found while replaying a product's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditIssue {
    /// A record's previous stock does not continue from the record before it.
    BrokenChain { sequence: u64, expected_previous: i64, recorded_previous: i64 },
    /// A record's new stock is not what its own rule produces.
    RuleMismatch { sequence: u64, expected_new: i64, recorded_new: i64 },
    /// The last record does not land on the stored balance.
    BalanceDrift { replayed: i64, current: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub product_id: ProductId,
    pub current_stock: i64,
    pub movement_count: usize,
    pub replayed_stock: i64,
    pub consistent: bool,
    pub issues: Vec<AuditIssue>,
}

/// Check that `records` (any order) explain `balance.current_stock`.
pub fn audit_chain(balance: &ProductBalance, records: &[MovementRecord]) -> AuditReport {
    let mut ordered: Vec<&MovementRecord> = records
        .iter()
        .filter(|r| r.product_id == balance.product_id)
        .collect();
    ordered.sort_by_key(|r| r.sequence);

    let mut issues = Vec::new();
    let mut last_new: Option<i64> = None;

    for r in &ordered {
        if let Some(expected_previous) = last_new {
            if r.previous_stock != expected_previous {
                issues.push(AuditIssue::BrokenChain {
                    sequence: r.sequence,
                    expected_previous,
                    recorded_previous: r.previous_stock,
                });
            }
        }

        let expected_new = Quantity::new(r.quantity)
            .and_then(|q| next_stock(r.movement_type, r.previous_stock, q))
            .ok();
        if expected_new != Some(r.new_stock) {
            issues.push(AuditIssue::RuleMismatch {
                sequence: r.sequence,
                expected_new: expected_new.unwrap_or(r.previous_stock),
                recorded_new: r.new_stock,
            });
        }

        last_new = Some(r.new_stock);
    }

    // No records: the balance is still its registration seed.
    let replayed_stock = last_new.unwrap_or(balance.current_stock);
    if replayed_stock != balance.current_stock {
        issues.push(AuditIssue::BalanceDrift {
            replayed: replayed_stock,
            current: balance.current_stock,
        });
    }

    AuditReport {
        product_id: balance.product_id,
        current_stock: balance.current_stock,
        movement_count: ordered.len(),
        replayed_stock,
        consistent: issues.is_empty(),
        issues,
    }
}
