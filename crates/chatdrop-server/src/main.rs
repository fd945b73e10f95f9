//! # chatdrop-server
//!
//! Local-network chat and file drop.
//!
//! This binary provides:
//! - **Chat page** rendered with the persisted message history
//! - **Realtime gateway** (WebSocket) that relays messages, deletions and
//!   AI reflections to every connected browser
//! - **Upload and download** endpoints backed by a plain directory
//! - **AI responder** that forwards a message to a chat-completion endpoint

mod api;
mod config;
mod error;
mod gateway;
mod hub;
mod responder;
mod uploads;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatdrop_server=debug")),
        )
        .init();

    info!("Starting chatdrop server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        model = %config.ai_model,
        max_history = config.max_history,
        "AI responder settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems (message log, upload directory, templates)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let app_state = AppState::new(config).await?;

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
