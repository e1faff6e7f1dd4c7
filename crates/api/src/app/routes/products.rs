use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};

use stockledger_core::ProductId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/balance", get(get_balance).post(register_balance))
        .route("/:id/thresholds", put(update_thresholds))
        .route("/:id/movements", get(list_product_movements))
        .route("/:id/audit", get(audit_product))
}

fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse::<ProductId>()
        .map_err(errors::domain_error_to_response)
}

pub async fn register_balance(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    body: Result<Json<dto::RegisterBalanceBody>, JsonRejection>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    // A bodiless POST registers with the defaults.
    let body = match body {
        Ok(Json(b)) => b,
        Err(JsonRejection::MissingJsonContentType(_)) => dto::RegisterBalanceBody::default(),
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let (seed, info) = body.into_parts(product_id);

    services.remember_user(actor.user_id(), actor.display_name());
    match services
        .register_product(seed, info, Some(actor.user_id()))
        .await
    {
        Ok(balance) => (StatusCode::CREATED, Json(dto::BalanceResponse::from(balance))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.balance(product_id).await {
        Ok(balance) => Json(dto::BalanceResponse::from(balance)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_thresholds(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    body: Result<Json<dto::ThresholdsBody>, JsonRejection>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services
        .update_thresholds(
            product_id,
            body.minimum_stock,
            body.maximum_stock,
            actor.user_id(),
        )
        .await
    {
        Ok(balance) => Json(dto::BalanceResponse::from(balance)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_product_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    query: Result<Query<dto::PageQuery>, QueryRejection>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    match services
        .list_product_movements(product_id, query.page, query.limit, query.as_of)
        .await
    {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn audit_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.audit(product_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
