use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    response::IntoResponse,
    routing::get,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movements).post(apply_movement))
        .route("/count", get(count_movements))
}

pub async fn apply_movement(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    body: Result<Json<dto::MovementBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let request = match body.into_request(actor.user_id()) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    services.remember_user(actor.user_id(), actor.display_name());
    match services.apply_movement(request).await {
        Ok(applied) => Json(dto::MovementResponse::from(applied)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListMovementsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.list_movements(filter, query.page, query.limit).await {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn count_movements(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::CountQuery>, QueryRejection>,
) -> axum::response::Response {
    let since = match query.map_err(errors::query_rejection).and_then(|Query(q)| {
        q.since().map_err(errors::domain_error_to_response)
    }) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.count_since(since).await {
        Ok(count) => Json(dto::CountResponse { count }).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
