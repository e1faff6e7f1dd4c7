use axum::body::Body;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use stockledger_core::UserId;

use crate::context::ActorContext;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Resolve the acting user from headers set by the upstream auth layer.
///
/// A missing or malformed id leaves the request anonymous; routes that
/// mutate the ledger reject anonymous requests through the `ActorContext`
/// extractor.
pub async fn actor_middleware(mut req: Request<Body>, next: Next) -> Response {
    if let Some(actor) = actor_from_headers(req.headers()) {
        req.extensions_mut().insert(actor);
    }
    next.run(req).await
}

fn actor_from_headers(headers: &HeaderMap) -> Option<ActorContext> {
    let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?;
    let user_id = match raw.trim().parse::<UserId>() {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed {USER_ID_HEADER} header");
            return None;
        }
    };
    let name = headers
        .get(USER_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(ActorContext::new(user_id, name))
}
