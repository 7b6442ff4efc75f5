//! Message sending, listing, acknowledgment, and deletion handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::chat::SendRequest;
use crate::server::state::SharedState;
use crate::server::utils::{chat_error, AuthUser};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    text: Option<String>,
    /// Raw image payload; resolved to a URL by the media service.
    image: Option<String>,
    reply_to: Option<String>,
}

pub async fn send_message_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(receiver_id): Path<String>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    let st = state.lock().await;
    let send = SendRequest {
        text: req.text,
        image: req.image,
        reply_to: req.reply_to,
    };
    match st.chat.send_message(&st.storage, &user_id, &receiver_id, send) {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(e) => chat_error(e),
    }
}

pub async fn list_messages_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(peer_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.list_messages(&st.storage, &user_id, &peer_id) {
        Ok(views) => (StatusCode::OK, axum::Json(views)).into_response(),
        Err(e) => chat_error(e),
    }
}

pub async fn mark_seen_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.mark_seen(&st.storage, &message_id, &user_id) {
        Ok(status) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": status })),
        )
            .into_response(),
        Err(e) => chat_error(e),
    }
}

/// HTTP twin of the socket `message_delivered` acknowledgment.
pub async fn mark_delivered_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.mark_delivered(&st.storage, &message_id, &user_id) {
        Ok(status) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": status })),
        )
            .into_response(),
        Err(e) => chat_error(e),
    }
}

pub async fn delete_for_me_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.delete_for_me(&st.storage, &message_id, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "deleted_message_id": message_id })),
        )
            .into_response(),
        Err(e) => chat_error(e),
    }
}

pub async fn delete_for_everyone_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.chat.delete_for_everyone(&st.storage, &message_id, &user_id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(e) => chat_error(e),
    }
}
