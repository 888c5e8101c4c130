use parley_shared::error::FrameError;
use parley_shared::protocol::Reply;
use parley_store::StoreError;
use thiserror::Error;

/// Every expected failure of a chat operation. All of them are recovered at
/// the connection boundary and turned into an `ok: false` reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Already friends with {0}")]
    AlreadyFriends(String),

    #[error("No pending friend request from {0}")]
    NoSuchRequest(String),

    #[error("Not friends with {0}")]
    NotFriends(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Not a member of room {0}")]
    NotRoomMember(String),

    #[error("Storage unavailable, try again")]
    PersistenceUnavailable(#[source] StoreError),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Login required")]
    NotAuthenticated,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// In-memory state contradicts itself. Fatal for the one connection
    /// that observed it.
    #[error("Internal state error: {0}")]
    Inconsistent(String),
}

impl ChatError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::DuplicateUsername => "duplicate_username",
            ChatError::InvalidCredentials => "invalid_credentials",
            ChatError::UserNotFound(_) => "user_not_found",
            ChatError::AlreadyFriends(_) => "already_friends",
            ChatError::NoSuchRequest(_) => "no_such_request",
            ChatError::NotFriends(_) => "not_friends",
            ChatError::RoomNotFound(_) => "room_not_found",
            ChatError::NotRoomMember(_) => "not_room_member",
            ChatError::PersistenceUnavailable(_) => "persistence_unavailable",
            ChatError::MalformedFrame(_) => "malformed_frame",
            ChatError::NotAuthenticated => "not_authenticated",
            ChatError::InvalidRequest(_) => "invalid_request",
            ChatError::UnsupportedAction(_) => "unsupported_action",
            ChatError::Inconsistent(_) => "internal_error",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, ChatError::PersistenceUnavailable(_))
    }

    /// Whether the connection that hit this error must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::Inconsistent(_))
    }

    pub fn to_reply(&self, action: &str) -> Reply {
        let message = match self {
            // Internal details stay in the logs.
            ChatError::Inconsistent(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        Reply::failure(action, message, self.code(), self.retryable())
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Persistence operation failed");
        ChatError::PersistenceUnavailable(e)
    }
}

impl From<FrameError> for ChatError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Malformed(reason) => ChatError::MalformedFrame(reason),
            FrameError::UnsupportedAction(action) => ChatError::UnsupportedAction(action),
            FrameError::InvalidPayload { reason, .. } => ChatError::InvalidRequest(reason),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
