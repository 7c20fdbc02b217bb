//! Error types for sovereign-core

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias using sovereign-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sovereign-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The durable store could not be opened or accessed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Database error that does not indicate an unavailable store
    #[error("Database error: {0}")]
    Database(String),

    /// The remote API could not be reached for the whole cycle
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A single queued operation failed to replay
    #[error("Replay of queued operation {id} failed: {reason}")]
    ItemReplayFailed { id: i64, reason: String },

    /// The remote answered with a non-success status
    #[error("Remote API error: {0}")]
    Remote(String),

    /// The remote rejected the credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A stored or received record could not be decoded
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the store itself is gone, as opposed to a bad query.
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        let unavailable = match &error {
            rusqlite::Error::SqliteFailure(failure, _) => matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::ReadOnly
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::DiskFull
                    | ErrorCode::PermissionDenied
                    | ErrorCode::FileLockingProtocolFailed
            ),
            rusqlite::Error::InvalidPath(_) => true,
            _ => false,
        };

        if unavailable {
            Self::StorageUnavailable(error.to_string())
        } else {
            Self::Database(error.to_string())
        }
    }
}
