//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `friend_edges`, `rooms`,
//! `room_members`, and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username      TEXT PRIMARY KEY NOT NULL,
    display_name  TEXT NOT NULL,
    password_salt TEXT NOT NULL,              -- hex-encoded 16-byte salt
    password_hash TEXT NOT NULL,              -- hex-encoded 32-byte BLAKE3 hash
    created_at    TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Friend edges: one row per ordered (requester, target) pair
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_edges (
    requester  TEXT NOT NULL,
    target     TEXT NOT NULL,
    status     TEXT NOT NULL,                 -- 'pending' | 'accepted'
    updated_at TEXT NOT NULL,

    PRIMARY KEY (requester, target),
    FOREIGN KEY (requester) REFERENCES users(username),
    FOREIGN KEY (target)    REFERENCES users(username)
);

CREATE INDEX IF NOT EXISTS idx_friend_edges_target ON friend_edges(target);

-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name       TEXT NOT NULL,
    owner      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (owner) REFERENCES users(username)
);

CREATE TABLE IF NOT EXISTS room_members (
    room_id   TEXT NOT NULL,
    username  TEXT NOT NULL,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (room_id, username),
    FOREIGN KEY (room_id)  REFERENCES rooms(id) ON DELETE CASCADE,
    FOREIGN KEY (username) REFERENCES users(username)
);

-- ----------------------------------------------------------------
-- Messages (direct and room logs)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,         -- UUID v4
    channel     TEXT NOT NULL,                -- 'room:<id>' or 'dm:<len>:<a>:<b>'
    sender      TEXT NOT NULL,
    target_type TEXT NOT NULL,                -- 'dm' | 'room'
    recipient   TEXT NOT NULL,                -- username or room id
    kind        TEXT NOT NULL,                -- 'text' | 'image' | 'file'
    content     TEXT NOT NULL,
    filename    TEXT,
    data_base64 TEXT,
    timestamp   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_seq
    ON messages(channel, seq DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
