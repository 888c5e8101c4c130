//! # parley-server
//!
//! Line-delimited JSON chat server.
//!
//! This binary provides:
//! - **Accounts** with salted password hashes, one live session per user
//! - **Friend graph** with pending requests and presence notifications
//! - **Rooms** that disappear together with their history once empty
//! - **Message routing** for direct and room messages, with a durable
//!   offline queue for direct messages
//!
//! All state is cached in memory and written through to SQLite.

mod accounts;
mod config;
mod connection;
mod credentials;
mod error;
mod friends;
mod hub;
mod presence;
mod rooms;
mod router;
mod sessions;


use std::sync::Arc;

use parley_store::{Database, Gateway};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = Arc::new(ServerConfig::from_env());
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open storage and warm the in-memory state
    // -----------------------------------------------------------------------
    let database = if config.in_memory() {
        info!("Using in-memory database, nothing will survive a restart");
        Database::open_in_memory()?
    } else {
        Database::open_at(&config.database_path)?
    };
    let gateway: Box<dyn Gateway> = Box::new(database);
    let hub = Arc::new(Hub::open(gateway, config.clone())?);

    // -----------------------------------------------------------------------
    // 4. Accept connections until shutdown
    // -----------------------------------------------------------------------
    let listener = TcpListener::bind(config.listen_addr).await?;

    tokio::select! {
        result = connection::serve(listener, hub.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Chat listener failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(
                online = hub.sessions().online_count().await,
                "Received Ctrl+C, shutting down"
            );
        }
    }

    Ok(())
}
