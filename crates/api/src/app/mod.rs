//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store backend selection, ledger engine, listing facade, monitor
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response bodies and their mapping onto ledger types
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    tracing::info!(backend = services.backend_name(), "services ready");
    Ok(router_with(Arc::new(services)))
}

/// Router over already-built services.
pub fn router_with(services: Arc<AppServices>) -> Router {
    let ledger = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn(middleware::actor_middleware)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(ledger)
}
