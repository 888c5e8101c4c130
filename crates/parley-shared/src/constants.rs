/// Salt size in bytes for password hashing
pub const SALT_SIZE: usize = 16;

/// Password hash output size in bytes (BLAKE3)
pub const PASSWORD_HASH_SIZE: usize = 32;

/// Key derivation context for password hashing (BLAKE3)
pub const KDF_CONTEXT_PASSWORD: &str = "parley-password-hash-v1";

/// Default TCP listen address (server)
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5555";

/// Default number of messages returned by `fetch_history`
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Upper bound on a requested history page
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Maximum number of `search_users` results
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Maximum inbound frame size in bytes (8 MiB, room for base64 attachments)
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
