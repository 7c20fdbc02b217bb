use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] sovereign_core::Error),
    #[error(transparent)]
    Remote(#[from] sovereign_core::remote::RemoteError),
    #[error(transparent)]
    Auth(#[from] sovereign_core::auth::AuthError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Queued operation {0} not found")]
    OperationNotFound(i64),
    #[error("Queued operation {0} is not in the failed state")]
    OperationNotFailed(i64),
    #[error("Cache entry not found or expired: {0}")]
    CacheMiss(String),
    #[error("Refusing to clear the queue without --yes")]
    ConfirmationRequired,
    #[error("Access token cannot be empty")]
    EmptyToken,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
