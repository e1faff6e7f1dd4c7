//! Request/response bodies and their mapping onto ledger types.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{DomainError, DomainResult, ProductId, UserId};
use stockledger_infra::{AppliedMovement, MovementFilter, ProductInfo};
use stockledger_ledger::{
    BalanceSeed, CostInput, Location, MovementReason, MovementRecord, MovementRequest,
    MovementType, ProductBalance, Quantity, StockStatus,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementBody {
    pub product_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    /// Kept loose so `"5"` and `5.0` get a typed `invalid_quantity` error path.
    #[serde(default)]
    pub quantity: JsonValue,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub location: Option<Location>,
    pub batch_number: Option<String>,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    pub cost: Option<CostInput>,
}

impl MovementBody {
    pub fn into_request(self, user_id: UserId) -> DomainResult<MovementRequest> {
        let product_id: ProductId = required(self.product_id, "productId")?.trim().parse()?;
        let movement_type: MovementType = required(self.movement_type, "type")?.trim().parse()?;
        let quantity = Quantity::from_json(&self.quantity)?;

        let mut request = MovementRequest::new(product_id, movement_type, quantity, user_id);
        request.reason = parse_reason(self.reason)?;
        request.reference = self.reference;
        request.notes = self.notes;
        request.location = self.location;
        request.batch_number = self.batch_number;
        request.serial_numbers = self.serial_numbers;
        request.cost = self.cost;
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementResponse {
    pub message: &'static str,
    pub movement: MovementRecord,
    pub new_stock: i64,
    pub total_sold: i64,
}

impl From<AppliedMovement> for MovementResponse {
    fn from(applied: AppliedMovement) -> Self {
        Self {
            message: "stock movement recorded",
            new_stock: applied.new_stock(),
            total_sold: applied.total_sold(),
            movement: applied.record,
        }
    }
}

/// Query string of `GET /movements`. Every filter is optional and they combine with AND.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMovementsQuery {
    pub product_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub reason: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub as_of: Option<u64>,
}

impl ListMovementsQuery {
    pub fn to_filter(&self) -> DomainResult<MovementFilter> {
        Ok(MovementFilter {
            product_id: non_empty(&self.product_id).map(str::parse).transpose()?,
            movement_type: non_empty(&self.movement_type).map(str::parse).transpose()?,
            reason: parse_reason(self.reason.clone())?,
            user_id: non_empty(&self.user_id).map(str::parse).transpose()?,
            date_from: non_empty(&self.date_from)
                .map(|s| parse_instant(s, "dateFrom", NaiveTime::default()))
                .transpose()?,
            date_to: non_empty(&self.date_to)
                .map(|s| parse_instant(s, "dateTo", end_of_day()))
                .transpose()?,
            as_of: self.as_of,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub as_of: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountQuery {
    pub since: Option<String>,
}

impl CountQuery {
    pub fn since(&self) -> DomainResult<DateTime<Utc>> {
        let raw = non_empty(&self.since)
            .ok_or_else(|| DomainError::validation("since is required"))?;
        parse_instant(raw, "since", NaiveTime::default())
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBalanceBody {
    pub initial_stock: Option<i64>,
    pub minimum_stock: Option<i64>,
    pub maximum_stock: Option<i64>,
    pub name: Option<String>,
    pub sku: Option<String>,
}

impl RegisterBalanceBody {
    pub fn into_parts(self, product_id: ProductId) -> (BalanceSeed, ProductInfo) {
        let mut seed = BalanceSeed::new(product_id);
        if let Some(stock) = self.initial_stock {
            seed = seed.with_initial_stock(stock);
        }
        let minimum = self.minimum_stock.unwrap_or(seed.minimum_stock);
        let maximum = self.maximum_stock.unwrap_or(seed.maximum_stock);
        let info = ProductInfo {
            name: self.name.filter(|s| !s.trim().is_empty()),
            sku: self.sku.filter(|s| !s.trim().is_empty()),
        };
        (seed.with_thresholds(minimum, maximum), info)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsBody {
    pub minimum_stock: i64,
    pub maximum_stock: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(flatten)]
    pub balance: ProductBalance,
    pub status: StockStatus,
}

impl From<ProductBalance> for BalanceResponse {
    fn from(balance: ProductBalance) -> Self {
        Self {
            status: balance.status(),
            balance,
        }
    }
}

fn required(value: Option<String>, field: &str) -> DomainResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_reason(value: Option<String>) -> DomainResult<Option<MovementReason>> {
    non_empty(&value).map(str::parse).transpose()
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::default())
}

/// RFC 3339 instants, or a bare `YYYY-MM-DD` date taken at `date_time` UTC.
fn parse_instant(raw: &str, field: &str, date_time: NaiveTime) -> DomainResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(date_time).and_utc())
        .map_err(|_| {
            DomainError::validation(format!("{field} must be an RFC 3339 timestamp or a date"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: JsonValue) -> MovementBody {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn movement_body_maps_onto_request() {
        let product = ProductId::new();
        let user = UserId::new();
        let req = body(json!({
            "productId": product.to_string(),
            "type": "out",
            "quantity": "25",
            "reason": "sale",
            "serialNumbers": ["A1"],
        }))
        .into_request(user)
        .unwrap();

        assert_eq!(req.product_id, product);
        assert_eq!(req.movement_type, MovementType::StockOut);
        assert_eq!(req.quantity.get(), 25);
        assert_eq!(req.reason, Some(MovementReason::Sale));
        assert_eq!(req.user_id, user);
    }

    #[test]
    fn movement_body_errors_are_typed() {
        let product = ProductId::new().to_string();
        let user = UserId::new();

        let missing = body(json!({ "type": "in", "quantity": 1 })).into_request(user);
        assert!(matches!(missing, Err(DomainError::Validation(_))));

        let bad_type = body(json!({ "productId": product, "type": "sideways", "quantity": 1 }))
            .into_request(user);
        assert!(matches!(bad_type, Err(DomainError::InvalidMovementType(_))));

        let bad_qty = body(json!({ "productId": product, "type": "in", "quantity": 0 }))
            .into_request(user);
        assert!(matches!(bad_qty, Err(DomainError::InvalidQuantity(_))));

        let bad_id = body(json!({ "productId": "nope", "type": "in", "quantity": 1 }))
            .into_request(user);
        assert!(matches!(bad_id, Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn date_bounds_accept_bare_dates_inclusively() {
        let query = ListMovementsQuery {
            date_from: Some("2024-03-01".into()),
            date_to: Some("2024-03-01".into()),
            ..ListMovementsQuery::default()
        };
        let filter = query.to_filter().unwrap();
        let from = filter.date_from.unwrap();
        let to = filter.date_to.unwrap();
        assert_eq!(from.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(to > from);
        assert_eq!(to.date_naive(), from.date_naive());
    }

    #[test]
    fn registration_defaults_fill_in() {
        let (seed, info) = RegisterBalanceBody {
            initial_stock: Some(5),
            name: Some("Widget".into()),
            ..RegisterBalanceBody::default()
        }
        .into_parts(ProductId::new());
        assert_eq!(seed.initial_stock, 5);
        assert_eq!((seed.minimum_stock, seed.maximum_stock), (10, 1000));
        assert_eq!(info.name.as_deref(), Some("Widget"));
        assert_eq!(info.sku, None);
    }
}
