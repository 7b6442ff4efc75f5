//! Sidebar listing and conversation-level operations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;
use crate::server::utils::{api_error, chat_error, AuthUser};
use crate::sidebar::sidebar_for;

pub async fn sidebar_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    let st = state.lock().await;
    match sidebar_for(&st.storage, &user_id) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Clear the conversation with `peer_id` for the requester only.
pub async fn clear_conversation_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(peer_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.clear_conversation(&st.storage, &user_id, &peer_id) {
        Ok(hidden) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "hidden": hidden })),
        )
            .into_response(),
        Err(e) => chat_error(e),
    }
}
