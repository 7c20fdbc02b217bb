//! Shared durable store used by the app process and the background task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use crate::db::{
    ContentRepository, Database, MirrorRepository, QueueRepository, SqliteContentRepository,
    SqliteMirrorRepository, SqliteQueueRepository, SqliteSyncStatusRepository,
    SyncStatusRepository,
};
use crate::models::{
    CachedContent, Country, FailureRecord, NewOperation, OperationStatus, Project,
    QueuedOperation, RemoteCountry, RemoteProject, SyncStatusEntry, UpsertOutcome,
};
use crate::Result;

/// Row counts across the store's collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub pending_operations: usize,
    pub failed_operations: usize,
    pub cached_entries: usize,
    pub countries: usize,
    pub projects: usize,
}

/// Thread-safe handle over one open store connection.
///
/// Cloning is cheap and every clone shares the same connection.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open the store file at the given path, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                crate::Error::StorageUnavailable(format!(
                    "cannot create {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let db = Database::open(&path)?;
        tracing::debug!("Opened store at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: Some(path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: None,
        })
    }

    /// Filesystem location, if file backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // Queue

    pub async fn add_operation(&self, operation: &NewOperation) -> Result<i64> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).add(operation)
    }

    pub async fn get_operation(&self, id: i64) -> Result<Option<QueuedOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).get(id)
    }

    pub async fn list_operations(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).list_by_status(status)
    }

    pub async fn delete_operation(&self, id: i64) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).delete(id)
    }

    pub async fn record_operation_failure(
        &self,
        id: i64,
        reason: &str,
    ) -> Result<Option<FailureRecord>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).record_failure(id, reason)
    }

    pub async fn requeue_operation(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).requeue(id)
    }

    pub async fn clear_operations(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).clear()
    }

    // Content

    pub async fn put_content(&self, content: &CachedContent) -> Result<()> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).put(content)
    }

    pub async fn get_content(&self, id: &str) -> Result<Option<CachedContent>> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).get(id)
    }

    pub async fn list_content_by_type(&self, content_type: &str) -> Result<Vec<CachedContent>> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).list_by_type(content_type)
    }

    pub async fn list_content(&self) -> Result<Vec<CachedContent>> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).list_all()
    }

    pub async fn delete_content(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).delete(id)
    }

    /// Evict `id` only if it is still expired at `now`.
    pub async fn evict_content_if_expired(&self, id: &str, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).delete_if_expired(id, now)
    }

    pub async fn delete_expired_content(&self, now: i64) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).delete_expired(now)
    }

    pub async fn clear_content(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteContentRepository::new(db.connection()).clear()
    }

    // Sync status

    pub async fn set_sync_status(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let now = crate::util::now_millis();
        let db = self.db.lock().await;
        SqliteSyncStatusRepository::new(db.connection()).set(key, value, now)
    }

    pub async fn get_sync_status(&self, key: &str) -> Result<Option<SyncStatusEntry>> {
        let db = self.db.lock().await;
        SqliteSyncStatusRepository::new(db.connection()).get(key)
    }

    pub async fn list_sync_status(&self) -> Result<Vec<SyncStatusEntry>> {
        let db = self.db.lock().await;
        SqliteSyncStatusRepository::new(db.connection()).list()
    }

    // Mirrors

    pub async fn upsert_country(
        &self,
        country: &RemoteCountry,
        synced_at: i64,
    ) -> Result<UpsertOutcome> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).upsert_country(country, synced_at)
    }

    pub async fn upsert_project(
        &self,
        project: &RemoteProject,
        synced_at: i64,
    ) -> Result<UpsertOutcome> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).upsert_project(project, synced_at)
    }

    pub async fn get_country(&self, country_code: &str) -> Result<Option<Country>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).get_country(country_code)
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).get_project(project_id)
    }

    pub async fn list_countries(&self, limit: usize) -> Result<Vec<Country>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).list_countries(limit)
    }

    pub async fn list_projects(&self, limit: usize) -> Result<Vec<Project>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).list_projects(limit)
    }

    /// Counts for the status view.
    pub async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let queue = SqliteQueueRepository::new(conn);
        let mirrors = SqliteMirrorRepository::new(conn);
        let cached: i64 = conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;

        Ok(StoreStats {
            pending_operations: queue.count(OperationStatus::Pending)?,
            failed_operations: queue.count(OperationStatus::Failed)?,
            cached_entries: usize::try_from(cached).unwrap_or_default(),
            countries: mirrors.count_countries()?,
            projects: mirrors.count_projects()?,
        })
    }
}

/// Where a [`StoreHandle`] opens its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

/// Lazily opened, memoized store.
///
/// The first `open` call opens the connection and runs migrations; every later
/// or concurrent call gets a clone of the same [`Store`].
#[derive(Clone)]
pub struct StoreHandle {
    location: StoreLocation,
    cell: Arc<OnceCell<Store>>,
}

impl StoreHandle {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::File(path.into()))
    }

    pub const fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn is_open(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn open(&self) -> Result<Store> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                match &self.location {
                    StoreLocation::File(path) => Store::open(path.clone()).await,
                    StoreLocation::InMemory => Store::open_in_memory().await,
                }
            })
            .await?;
        Ok(store.clone())
    }
}
