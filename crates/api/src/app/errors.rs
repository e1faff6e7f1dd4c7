use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockledger_core::DomainError;
use stockledger_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    match err {
        LedgerError::Domain(e) => domain_error_to_response(e),
        LedgerError::StorageContention { .. } => {
            json_error(StatusCode::CONFLICT, "storage_contention", err.to_string())
        }
        LedgerError::StorageTimeout { .. } => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_timeout", err.to_string())
        }
        LedgerError::Storage(_) => {
            tracing::error!(error = %err, "storage failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_error", err.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidMovementType(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_movement_type", message)
        }
        DomainError::InvalidQuantity(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_quantity", message)
        }
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::InsufficientStock {
            available,
            requested,
        } => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "available": available,
                "requested": requested,
            })),
        )
            .into_response(),
        DomainError::ProductNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "product_not_found", message)
        }
        DomainError::DuplicateProduct(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_product", message)
        }
        DomainError::InvariantViolation(_) => {
            tracing::error!(error = %message, "invariant violated");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", message)
        }
    }
}

pub fn json_rejection(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
