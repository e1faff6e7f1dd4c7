use axum::{Router, routing::get};

pub mod alerts;
pub mod movements;
pub mod products;
pub mod system;

/// Router for all ledger endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/alerts", get(alerts::list_alerts))
        .nest("/movements", movements::router())
        .nest("/products", products::router())
}
