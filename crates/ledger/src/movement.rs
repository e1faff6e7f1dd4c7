use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{DomainError, DomainResult, MovementId, ProductId, UserId};

const MAX_REFERENCE_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 500;
const DEFAULT_CURRENCY: &str = "USD";

/// The four kinds of stock movement.
///
/// Closed set: every rule in the ledger is an exhaustive match over these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "in")]
    StockIn,
    #[serde(rename = "out")]
    StockOut,
    #[serde(rename = "adjustment")]
    Adjustment,
    #[serde(rename = "transfer")]
    Transfer,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::StockIn,
        MovementType::StockOut,
        MovementType::Adjustment,
        MovementType::Transfer,
    ];

    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "in",
            MovementType::StockOut => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "stock-in" | "stock_in" => Ok(MovementType::StockIn),
            "out" | "stock-out" | "stock_out" => Ok(MovementType::StockOut),
            "adjustment" => Ok(MovementType::Adjustment),
            "transfer" => Ok(MovementType::Transfer),
            _ => Err(DomainError::InvalidMovementType(s.to_string())),
        }
    }
}

/// Why a movement happened (reporting category, no effect on arithmetic).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Purchase,
    Sale,
    Return,
    Damaged,
    Expired,
    Theft,
    CountAdjustment,
    TransferIn,
    TransferOut,
    Production,
    Consumption,
    Other,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Sale => "sale",
            MovementReason::Return => "return",
            MovementReason::Damaged => "damaged",
            MovementReason::Expired => "expired",
            MovementReason::Theft => "theft",
            MovementReason::CountAdjustment => "count_adjustment",
            MovementReason::TransferIn => "transfer_in",
            MovementReason::TransferOut => "transfer_out",
            MovementReason::Production => "production",
            MovementReason::Consumption => "consumption",
            MovementReason::Other => "other",
        }
    }
}

impl FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reason = match s.trim().to_ascii_lowercase().as_str() {
            "purchase" => MovementReason::Purchase,
            "sale" => MovementReason::Sale,
            "return" => MovementReason::Return,
            "damaged" => MovementReason::Damaged,
            "expired" => MovementReason::Expired,
            "theft" => MovementReason::Theft,
            "count_adjustment" => MovementReason::CountAdjustment,
            "transfer_in" => MovementReason::TransferIn,
            "transfer_out" => MovementReason::TransferOut,
            "production" => MovementReason::Production,
            "consumption" => MovementReason::Consumption,
            "other" => MovementReason::Other,
            _ => return Err(DomainError::validation(format!("unknown reason: {s:?}"))),
        };
        Ok(reason)
    }
}

/// Where the goods moved from/to. Free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf: Option<String>,
}

impl Location {
    /// Trim every field, drop blank ones, and collapse an all-blank location to `None`.
    pub fn normalized(self) -> Option<Location> {
        let loc = Location {
            from: non_blank(self.from),
            to: non_blank(self.to),
            warehouse: non_blank(self.warehouse),
            zone: non_blank(self.zone),
            shelf: non_blank(self.shelf),
        };
        let empty = loc.from.is_none()
            && loc.to.is_none()
            && loc.warehouse.is_none()
            && loc.zone.is_none()
            && loc.shelf.is_none();
        if empty { None } else { Some(loc) }
    }
}

/// A strictly positive integer quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must be a positive integer, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Parse a quantity as it arrives on the wire: a JSON integer, a whole
    /// float, or a string holding an integer.
    pub fn from_json(value: &JsonValue) -> DomainResult<Self> {
        match value {
            JsonValue::Null => Err(DomainError::validation("quantity is required")),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Self::new(i);
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Self::new(f as i64),
                    _ => Err(DomainError::invalid_quantity(format!(
                        "quantity must be an integer, got {n}"
                    ))),
                }
            }
            JsonValue::String(s) => {
                let parsed = s.trim().parse::<i64>().map_err(|_| {
                    DomainError::invalid_quantity(format!("quantity must be an integer, got {s:?}"))
                })?;
                Self::new(parsed)
            }
            other => Err(DomainError::invalid_quantity(format!(
                "quantity must be an integer, got {other}"
            ))),
        }
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

/// Unit cost as supplied by the caller, in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostInput {
    pub unit_cost: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Cost snapshot stored on the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementCost {
    pub unit_cost: i64,
    pub total_cost: i64,
    pub currency: String,
}

impl CostInput {
    fn resolve(&self, quantity: Quantity) -> DomainResult<MovementCost> {
        if self.unit_cost < 0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        let currency = match self.currency.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_CURRENCY.to_string(),
            Some(c) if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
                c.to_ascii_uppercase()
            }
            Some(c) => {
                return Err(DomainError::validation(format!(
                    "currency must be a 3-letter code, got {c:?}"
                )));
            }
        };
        let total_cost = self
            .unit_cost
            .checked_mul(quantity.get())
            .ok_or_else(|| DomainError::validation("total cost overflows"))?;
        Ok(MovementCost {
            unit_cost: self.unit_cost,
            total_cost,
            currency,
        })
    }
}

/// Descriptive fields copied verbatim onto the movement record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDetails {
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub location: Option<Location>,
    pub batch_number: Option<String>,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    pub cost: Option<MovementCost>,
}

/// A caller's request to move stock for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub reason: Option<MovementReason>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub location: Option<Location>,
    pub batch_number: Option<String>,
    pub serial_numbers: Vec<String>,
    pub cost: Option<CostInput>,
    pub user_id: UserId,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        movement_type: MovementType,
        quantity: Quantity,
        user_id: UserId,
    ) -> Self {
        Self {
            product_id,
            movement_type,
            quantity,
            reason: None,
            reference: None,
            notes: None,
            location: None,
            batch_number: None,
            serial_numbers: Vec::new(),
            cost: None,
            user_id,
        }
    }

    pub fn with_reason(mut self, reason: MovementReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_cost(mut self, cost: CostInput) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Validate and normalise the optional fields.
    ///
    /// Runs before any store access; a failure here never touches state.
    pub fn details(&self) -> DomainResult<MovementDetails> {
        let reference = non_blank(self.reference.clone());
        if let Some(r) = &reference {
            if r.chars().count() > MAX_REFERENCE_LEN {
                return Err(DomainError::validation(format!(
                    "reference cannot exceed {MAX_REFERENCE_LEN} characters"
                )));
            }
        }

        if let Some(n) = &self.notes {
            if n.chars().count() > MAX_NOTES_LEN {
                return Err(DomainError::validation(format!(
                    "notes cannot exceed {MAX_NOTES_LEN} characters"
                )));
            }
        }

        let cost = self
            .cost
            .as_ref()
            .map(|c| c.resolve(self.quantity))
            .transpose()?;

        Ok(MovementDetails {
            reason: self.reason,
            reference,
            notes: self.notes.clone().filter(|n| !n.is_empty()),
            location: self.location.clone().and_then(Location::normalized),
            batch_number: non_blank(self.batch_number.clone()),
            serial_numbers: self
                .serial_numbers
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cost,
        })
    }
}

/// A movement decided by the rules but not yet committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    #[serde(flatten)]
    pub details: MovementDetails,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl NewMovement {
    /// Attach the commit sequence the store assigned.
    pub fn into_record(self, sequence: u64) -> MovementRecord {
        MovementRecord {
            id: self.id,
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            previous_stock: self.previous_stock,
            new_stock: self.new_stock,
            details: self.details,
            user_id: self.user_id,
            timestamp: self.timestamp,
            sequence,
        }
    }
}

/// A committed, immutable movement record.
///
/// `previous_stock`/`new_stock` are the balance transition frozen at commit
/// time; nothing ever rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRecord {
    pub id: MovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    #[serde(flatten)]
    pub details: MovementDetails,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    /// Ledger-wide commit position (strictly increasing).
    pub sequence: u64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(quantity: i64) -> MovementRequest {
        MovementRequest::new(
            ProductId::new(),
            MovementType::StockIn,
            Quantity::new(quantity).unwrap(),
            UserId::new(),
        )
    }

    #[test]
    fn movement_type_accepts_wire_tags_and_aliases() {
        assert_eq!("in".parse::<MovementType>().unwrap(), MovementType::StockIn);
        assert_eq!(" Stock-Out ".parse::<MovementType>().unwrap(), MovementType::StockOut);
        assert_eq!("adjustment".parse::<MovementType>().unwrap(), MovementType::Adjustment);
        assert_eq!("transfer".parse::<MovementType>().unwrap(), MovementType::Transfer);

        let err = "refund".parse::<MovementType>().unwrap_err();
        assert_eq!(err, DomainError::InvalidMovementType("refund".to_string()));
    }

    #[test]
    fn movement_type_serializes_as_wire_tag() {
        for t in MovementType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }

    #[test]
    fn unknown_reason_is_validation_error() {
        assert_eq!("sale".parse::<MovementReason>().unwrap(), MovementReason::Sale);
        assert!(matches!(
            "gift".parse::<MovementReason>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn quantity_rejects_non_positive() {
        assert!(matches!(Quantity::new(0), Err(DomainError::InvalidQuantity(_))));
        assert!(matches!(Quantity::new(-3), Err(DomainError::InvalidQuantity(_))));
        assert_eq!(Quantity::new(3).unwrap().get(), 3);
    }

    #[test]
    fn quantity_from_json_accepts_integers_and_integer_strings() {
        assert_eq!(Quantity::from_json(&json!(5)).unwrap().get(), 5);
        assert_eq!(Quantity::from_json(&json!(5.0)).unwrap().get(), 5);
        assert_eq!(Quantity::from_json(&json!(" 12 ")).unwrap().get(), 12);
    }

    #[test]
    fn quantity_from_json_rejects_everything_else() {
        for bad in [json!(2.5), json!("abc"), json!("1.5"), json!(true), json!([1]), json!(-1)] {
            assert!(
                matches!(Quantity::from_json(&bad), Err(DomainError::InvalidQuantity(_))),
                "{bad} should be rejected"
            );
        }
        assert!(matches!(
            Quantity::from_json(&JsonValue::Null),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn details_enforce_length_limits() {
        let too_long = "x".repeat(MAX_REFERENCE_LEN + 1);
        assert!(request(1).with_reference(too_long).details().is_err());

        let notes = "n".repeat(MAX_NOTES_LEN + 1);
        assert!(request(1).with_notes(notes).details().is_err());
    }

    #[test]
    fn details_normalise_blank_fields() {
        let details = request(1)
            .with_reference("  PO-42  ")
            .with_location(Location {
                warehouse: Some("  ".to_string()),
                ..Location::default()
            })
            .details()
            .unwrap();

        assert_eq!(details.reference.as_deref(), Some("PO-42"));
        assert_eq!(details.location, None);
    }

    #[test]
    fn cost_total_is_unit_times_quantity() {
        let details = request(4)
            .with_cost(CostInput {
                unit_cost: 250,
                currency: Some("eur".to_string()),
            })
            .details()
            .unwrap();

        assert_eq!(
            details.cost,
            Some(MovementCost {
                unit_cost: 250,
                total_cost: 1000,
                currency: "EUR".to_string(),
            })
        );
    }

    #[test]
    fn cost_defaults_to_usd_and_rejects_bad_input() {
        let cost = request(1)
            .with_cost(CostInput { unit_cost: 1, currency: None })
            .details()
            .unwrap()
            .cost
            .unwrap();
        assert_eq!(cost.currency, "USD");

        assert!(request(1)
            .with_cost(CostInput { unit_cost: -1, currency: None })
            .details()
            .is_err());
        assert!(request(1)
            .with_cost(CostInput { unit_cost: 1, currency: Some("dollars".to_string()) })
            .details()
            .is_err());
        assert!(request(2)
            .with_cost(CostInput { unit_cost: i64::MAX, currency: None })
            .details()
            .is_err());
    }

    #[test]
    fn record_serializes_with_camel_case_and_type_tag() {
        let movement = NewMovement {
            id: MovementId::new(),
            product_id: ProductId::new(),
            movement_type: MovementType::StockOut,
            quantity: 2,
            previous_stock: 5,
            new_stock: 3,
            details: MovementDetails::default(),
            user_id: UserId::new(),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(movement.into_record(9)).unwrap();
        assert_eq!(value["type"], "out");
        assert_eq!(value["previousStock"], 5);
        assert_eq!(value["newStock"], 3);
        assert_eq!(value["sequence"], 9);
    }
}
