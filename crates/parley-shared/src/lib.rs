//! # parley-shared
//!
//! Types shared by the Parley chat server and its storage layer: usernames
//! and room identifiers, the message model, the line-delimited JSON wire
//! frames, and the salted password hashing primitive.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;
