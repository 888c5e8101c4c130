//! Schema migrations.
//!
//! `PRAGMA user_version` records the last applied step. Each pending step
//! runs in its own transaction together with the version bump, so a crash
//! mid-upgrade never leaves a half-applied schema behind.

pub mod v001_initial;
pub mod v002_offline_queue;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered upgrade steps; entry `i` moves the schema to version `i + 1`.
const STEPS: &[(&str, Step)] = &[
    ("v001_initial", v001_initial::up),
    ("v002_offline_queue", v002_offline_queue::up),
];

pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than this build (v{CURRENT_VERSION})"
        )));
    }

    for (index, (name, up)) in STEPS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        tracing::info!(migration = name, version, "applying migration");

        let tx = conn.transaction()?;
        up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    tracing::debug!(version = CURRENT_VERSION, "schema up to date");
    Ok(())
}
