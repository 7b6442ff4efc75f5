//! Shared utilities for the HTTP surface.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::chat::ChatError;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a chat-core error onto the HTTP surface.
pub fn chat_error(e: ChatError) -> Response {
    let status = match &e {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        ChatError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        ChatError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Authenticated caller identity, supplied by the upstream auth layer as the
/// `X-User-Id` header. This server trusts its ingress; session issuance and
/// verification live outside the chat core.
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            Some(id) => Ok(AuthUser(id.to_string())),
            None => Err(api_error(
                StatusCode::UNAUTHORIZED,
                "missing X-User-Id header",
            )),
        }
    }
}
