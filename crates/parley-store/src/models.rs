//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use parley_shared::types::RoomId;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. Accounts are never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub display_name: String,
    /// Hex-encoded per-user salt.
    pub password_salt: String,
    /// Hex-encoded salted password hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Friend graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    /// `requester` asked `target`, no answer yet.
    Pending,
    /// Friendship; symmetric regardless of who asked.
    Accepted,
}

impl EdgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Pending => "pending",
            EdgeStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EdgeStatus::Pending),
            "accepted" => Some(EdgeStatus::Accepted),
            _ => None,
        }
    }
}

/// One stored edge of the friend graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEdge {
    pub requester: String,
    pub target: String,
    pub status: EdgeStatus,
}

/// A state transition applied to the friend graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    /// none -> pending
    Request { requester: String, target: String },
    /// pending -> friends; clears pending rows in both directions
    Accept { requester: String, target: String },
    /// pending -> none
    Decline { requester: String, target: String },
    /// friends -> none
    Remove { a: String, b: String },
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// A room together with its current membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    pub owner: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Join { room: RoomId, username: String },
    Leave { room: RoomId, username: String },
    /// Drop the room, its membership rows and its message log.
    Delete { room: RoomId },
}
