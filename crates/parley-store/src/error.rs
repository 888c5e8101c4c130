use thiserror::Error;

/// Failures of the persistence layer. The server core treats every one of
/// them as "storage unavailable".
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found")]
    NotFound,

    /// Unique key collision, e.g. a username taken twice.
    #[error("Record already exists")]
    AlreadyExists,

    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored row could not be decoded into its model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A queued message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Map a unique/primary-key violation to [`StoreError::AlreadyExists`].
pub(crate) fn map_constraint(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::AlreadyExists
        }
        other => StoreError::Sqlite(other),
    }
}
