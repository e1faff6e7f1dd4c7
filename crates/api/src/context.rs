use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use stockledger_core::UserId;

use crate::app::errors;

/// The user a request acts on behalf of.
///
/// Placed in request extensions by [`crate::middleware::actor_middleware`].
/// Extracting it from a request that carried no valid `x-user-id` header is a
/// `401 unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
    display_name: Option<String>,
}

impl ActorContext {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ActorContext>().cloned().ok_or_else(|| {
            errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "a valid x-user-id header is required",
            )
        })
    }
}
