//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use parley_shared::constants::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_LISTEN_ADDR, DEFAULT_SEARCH_LIMIT, MAX_FRAME_BYTES,
    MAX_HISTORY_LIMIT,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address the chat listener binds to.
    /// Env: `LISTEN_ADDR`
    /// Default: `127.0.0.1:5555`
    pub listen_addr: SocketAddr,

    /// SQLite database file. `:memory:` keeps everything in RAM.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// Number of messages `fetch_history` returns when no limit is given.
    /// Env: `HISTORY_LIMIT`
    pub history_limit: usize,

    /// Cap applied to a client-supplied history limit.
    /// Env: `MAX_HISTORY_LIMIT`
    pub max_history_limit: usize,

    /// Maximum `search_users` results.
    /// Env: `SEARCH_LIMIT`
    pub search_limit: usize,

    /// Inbound lines longer than this are skipped.
    /// Env: `MAX_FRAME_BYTES`
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| ([127, 0, 0, 1], 5555).into()),
            database_path: PathBuf::from("./parley.db"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_history_limit: MAX_HISTORY_LIMIT,
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "LISTEN_ADDR", &mut config.listen_addr);

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }

        parse_into(&lookup, "HISTORY_LIMIT", &mut config.history_limit);
        parse_into(&lookup, "MAX_HISTORY_LIMIT", &mut config.max_history_limit);
        parse_into(&lookup, "SEARCH_LIMIT", &mut config.search_limit);
        parse_into(&lookup, "MAX_FRAME_BYTES", &mut config.max_frame_bytes);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Whether the database should live purely in memory.
    pub fn in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    /// Resolve a client-requested history page size.
    pub fn history_page(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history_limit)
            .min(self.max_history_limit)
    }
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
        }
    }
}
