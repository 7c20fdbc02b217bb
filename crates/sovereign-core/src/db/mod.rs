//! Durable store layer backed by `SQLite`

mod connection;
mod content_repository;
mod migrations;
mod mirror_repository;
mod queue_repository;
mod status_repository;

pub use connection::Database;
pub use content_repository::{ContentRepository, SqliteContentRepository};
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use mirror_repository::{MirrorRepository, SqliteMirrorRepository};
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use status_repository::{SqliteSyncStatusRepository, SyncStatusRepository};
