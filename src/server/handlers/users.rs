//! User record handlers: the persistence-collaborator surface used by
//! deployments (and tests) to provision profiles. Account credentials and
//! session issuance live with the external auth service.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::chat::now_secs;
use crate::server::state::SharedState;
use crate::server::utils::api_error;
use crate::storage::{StorageError, UserRow};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    user_id: String,
    display_name: String,
    avatar_url: Option<String>,
}

pub async fn create_user_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<CreateUserRequest>,
) -> Response {
    if req.user_id.trim().is_empty() || req.display_name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user_id and display_name required");
    }

    let row = UserRow {
        user_id: req.user_id.trim().to_string(),
        display_name: req.display_name.trim().to_string(),
        avatar_url: req.avatar_url,
        created_at: now_secs(),
    };

    let st = state.lock().await;
    match st.storage.insert_user(&row) {
        Ok(()) => (StatusCode::CREATED, axum::Json(row)).into_response(),
        Err(StorageError::AlreadyExists(msg)) => api_error(StatusCode::CONFLICT, msg),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_user_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(&user_id) {
        Ok(Some(user)) => (StatusCode::OK, axum::Json(user)).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
