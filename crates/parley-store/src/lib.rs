//! # parley-store
//!
//! Durable storage for the Parley chat server, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, typed CRUD helpers for every domain model, and the
//! [`Gateway`] trait through which the server core reaches storage. Every
//! gateway operation either commits fully or leaves prior state unchanged.

pub mod database;
pub mod friends;
pub mod gateway;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod offline;
pub mod rooms;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use gateway::Gateway;
pub use models::*;
