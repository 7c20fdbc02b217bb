//! Data models for the offline sync core

mod content;
mod entity;
mod operation;

pub use content::{CachedContent, SyncStatusEntry};
pub use entity::{
    Country, MirrorStats, Project, RemoteCountry, RemoteProject, UpsertOutcome,
};
pub use operation::{
    Action, FailureRecord, HttpMethod, NewOperation, OperationStatus, QueuedOperation,
    MAX_RETRIES,
};
