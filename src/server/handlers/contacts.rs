//! Saved-contact handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::chat::now_secs;
use crate::server::state::SharedState;
use crate::server::utils::{api_error, AuthUser};
use crate::storage::{ContactRow, StorageError};

#[derive(Deserialize)]
pub struct AddContactRequest {
    peer_id: String,
    /// Custom name to show instead of the peer's profile name.
    display_name: Option<String>,
}

pub async fn add_contact_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    axum::Json(req): axum::Json<AddContactRequest>,
) -> Response {
    if req.peer_id == user_id {
        return api_error(StatusCode::BAD_REQUEST, "cannot add yourself");
    }

    let st = state.lock().await;
    match st.storage.user_exists(&req.peer_id) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let row = ContactRow {
        owner_id: user_id,
        peer_id: req.peer_id,
        display_name: req
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        added_at: now_secs(),
    };
    match st.storage.insert_contact(&row) {
        Ok(()) => (
            StatusCode::CREATED,
            axum::Json(serde_json::json!({ "status": "ok" })),
        )
            .into_response(),
        Err(StorageError::AlreadyExists(_)) => {
            api_error(StatusCode::CONFLICT, "contact already exists")
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn list_contacts_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    let st = state.lock().await;
    let contacts = match st.storage.list_contacts(&user_id) {
        Ok(c) => c,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    // Enrich with profile data; the override wins on the display name.
    let mut json = Vec::with_capacity(contacts.len());
    for contact in contacts {
        let profile = st.storage.get_user(&contact.peer_id).ok().flatten();
        let display_name = contact
            .display_name
            .or_else(|| profile.as_ref().map(|p| p.display_name.clone()))
            .unwrap_or_else(|| contact.peer_id.clone());
        json.push(serde_json::json!({
            "peer_id": contact.peer_id,
            "display_name": display_name,
            "avatar_url": profile.and_then(|p| p.avatar_url),
            "is_saved": true,
        }));
    }
    (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
}
