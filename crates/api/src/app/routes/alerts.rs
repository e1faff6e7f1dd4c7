use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::services::AppServices;

/// Alerts raised by the threshold monitor since startup, oldest first.
pub async fn list_alerts(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({ "alerts": services.alerts() }))
}
