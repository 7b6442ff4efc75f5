//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chat::ChatService;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    pub chat: ChatService,
}

pub type SharedState = Arc<Mutex<AppState>>;
