//! Liveness handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let json = serde_json::json!({
        "status": "ok",
        "online_connections": st.chat.hub().connection_count(),
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}
