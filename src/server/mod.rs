//! parley-server: REST API + WebSocket push channel for the chat core.
//!
//! Persists state in SQLite and delegates image hosting to an external
//! media service when one is configured.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;

use crate::chat::ChatService;
use crate::media::MediaClient;
use crate::plog;
use crate::presence::PresenceHub;
use crate::storage::{db_path, Storage};

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    plog!("parley-server starting");
    plog!("  data directory: {}", config.data_dir.display());

    let storage =
        Storage::open(&db_path(&config.data_dir)).expect("failed to open database");
    plog!("  database: {}", db_path(&config.data_dir).display());

    match &config.media_url {
        Some(url) => plog!("  media service: {}", url),
        None => plog!("  media service: none configured (image sends degrade to text)"),
    }

    let hub = Arc::new(PresenceHub::new());
    let media = MediaClient::new(config.media_url.clone());
    let chat = ChatService::new(hub, media);

    let state: SharedState = Arc::new(Mutex::new(AppState { storage, chat }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    plog!("parley-server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
