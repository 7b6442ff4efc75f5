//! Axum router construction.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::server::handlers;
use crate::server::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Users API (persistence-collaborator surface)
        .route("/api/users", post(handlers::users::create_user_handler))
        .route("/api/users/:user_id", get(handlers::users::get_user_handler))
        // Contacts API
        .route(
            "/api/contacts",
            get(handlers::contacts::list_contacts_handler)
                .post(handlers::contacts::add_contact_handler),
        )
        // Sidebar
        .route(
            "/api/sidebar",
            get(handlers::conversations::sidebar_handler),
        )
        // Messages API: `:id` is the peer for list/send, the message for the
        // rest
        .route(
            "/api/messages/:id",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/messages/:id/seen",
            put(handlers::messages::mark_seen_handler),
        )
        .route(
            "/api/messages/:id/delivered",
            put(handlers::messages::mark_delivered_handler),
        )
        .route(
            "/api/messages/:id/for-me",
            delete(handlers::messages::delete_for_me_handler),
        )
        .route(
            "/api/messages/:id/for-everyone",
            delete(handlers::messages::delete_for_everyone_handler),
        )
        // Conversations API
        .route(
            "/api/conversations/:peer_id",
            delete(handlers::conversations::clear_conversation_handler),
        )
        // WebSocket push channel
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
