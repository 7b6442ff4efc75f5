//! WebSocket upgrade and per-connection event pump.
//!
//! The handshake carries the authenticated user id (supplied by the
//! upstream auth layer) as a query parameter. Each connection gets its own
//! unbounded channel; the registry holds the sending half, this task pumps
//! the receiving half into the socket and feeds inbound client frames to
//! the chat service.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::chat::ChatService;
use crate::plog;
use crate::push::ClientEvent;
use crate::server::config::MAX_WS_CONNECTIONS;
use crate::server::state::SharedState;
use crate::server::utils::api_error;

#[derive(Deserialize)]
pub struct WsQuery {
    user_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<SharedState>,
) -> Response {
    if query.user_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "user_id required");
    }

    let chat = {
        let st = state.lock().await;
        st.chat.clone()
    };

    if chat.hub().connection_count() >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many connections (max {MAX_WS_CONNECTIONS})"),
        );
    }

    let user_id = query.user_id;
    ws.on_upgrade(move |socket| ws_connection(socket, state, chat, user_id))
        .into_response()
}

async fn ws_connection(
    mut socket: WebSocket,
    state: SharedState,
    chat: ChatService,
    user_id: String,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection_id = chat.hub().register(&user_id, tx);

    loop {
        tokio::select! {
            // Forward push events to this connection
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    // Sender dropped: a newer connection replaced this one
                    None => break,
                }
            }
            // Handle frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Text(frame))) => {
                        handle_client_frame(&state, &user_id, &frame).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and pong frames are ignored
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Guarded: a stale close never evicts a newer connection.
    chat.hub().unregister(&user_id, connection_id);
}

async fn handle_client_frame(state: &SharedState, user_id: &str, frame: &str) {
    let event = match serde_json::from_str::<ClientEvent>(frame) {
        Ok(event) => event,
        Err(e) => {
            plog!(
                "ws: ignoring malformed frame from {}: {e}",
                crate::logging::user_id(user_id)
            );
            return;
        }
    };

    match event {
        // Typing never touches storage; relay straight through.
        ClientEvent::Typing { to } => {
            let st = state.lock().await;
            st.chat.typing(user_id, &to, true);
        }
        ClientEvent::StopTyping { to } => {
            let st = state.lock().await;
            st.chat.typing(user_id, &to, false);
        }
        ClientEvent::MessageDelivered { message_id } => {
            let st = state.lock().await;
            if let Err(e) = st.chat.mark_delivered(&st.storage, &message_id, user_id) {
                plog!("ws: delivery ack rejected: {e}");
            }
        }
        ClientEvent::MarkMessagesAsSeen { message_ids } => {
            let st = state.lock().await;
            if let Err(e) = st.chat.mark_messages_seen(&st.storage, user_id, &message_ids) {
                plog!("ws: seen batch failed: {e}");
            }
        }
    }
}
