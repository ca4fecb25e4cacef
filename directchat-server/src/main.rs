//! `DirectChat` server -- real-time direct messaging with presence.
//!
//! Accepts WebSocket connections on `/ws`, authenticates announced
//! identities, routes messages and typing signals between connected users,
//! and tracks the sent/delivered/read lifecycle. Read-side HTTP endpoints
//! serve user, conversation, and message listings.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:4000
//! cargo run --bin directchat-server
//!
//! # Run on custom address
//! cargo run --bin directchat-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! DIRECTCHAT_ADDR=127.0.0.1:8080 cargo run --bin directchat-server
//! ```

use std::sync::Arc;

use clap::Parser;
use directchat_server::auth::TokenAuthenticator;
use directchat_server::config::{ServerCliArgs, ServerConfig};
use directchat_server::socket::{self, AppState};
use directchat_server::store::MemoryStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting directchat server");

    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(TokenAuthenticator::new());
    let state = Arc::new(AppState::new(store, auth, config.max_text_len));

    match socket::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "directchat server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
