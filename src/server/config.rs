//! Configuration types and constants for the parley server.

use std::path::PathBuf;

use clap::Parser;

/// Upper bound on simultaneously open WebSocket connections. One user holds
/// at most one, so this caps the online population per process.
pub(crate) const MAX_WS_CONNECTIONS: usize = 4096;

/// Direct-message chat server with live presence and delivery tracking.
///
/// Provides a REST API for messages, contacts and the sidebar, plus a
/// WebSocket push channel for presence, typing, and status events. State is
/// persisted in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "parley-server", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: PARLEY_BIND] [default: 127.0.0.1:4000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: PARLEY_HOME] [default: ~/.parley]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Media service base URL for image hosting [env: PARLEY_MEDIA_URL]
    #[arg(long, short = 'm')]
    pub media_url: Option<String>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub media_url: Option<String>,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("PARLEY_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".parley"))
                    .unwrap_or_else(|_| PathBuf::from(".parley"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("PARLEY_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:4000".to_string());

        let media_url = cli
            .media_url
            .or_else(|| std::env::var("PARLEY_MEDIA_URL").ok());

        Self {
            bind_addr,
            data_dir,
            media_url,
        }
    }
}
