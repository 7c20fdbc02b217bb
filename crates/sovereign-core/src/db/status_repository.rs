//! Sync status repository

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::SyncStatusEntry;

/// Trait for sync status storage operations
pub trait SyncStatusRepository {
    /// Overwrite the value stored under `key`
    fn set(&self, key: &str, value: &serde_json::Value, timestamp: i64) -> Result<()>;

    /// Read the entry stored under `key`
    fn get(&self, key: &str) -> Result<Option<SyncStatusEntry>>;

    /// List every entry by key
    fn list(&self) -> Result<Vec<SyncStatusEntry>>;
}

/// `SQLite` implementation of `SyncStatusRepository`
pub struct SqliteSyncStatusRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStatusRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn decode(key: String, value: &str, timestamp: i64) -> Result<SyncStatusEntry> {
    let value = serde_json::from_str(value)
        .map_err(|error| Error::Malformed(format!("sync status '{key}': {error}")))?;
    Ok(SyncStatusEntry {
        key,
        value,
        timestamp,
    })
}

impl SyncStatusRepository for SqliteSyncStatusRepository<'_> {
    fn set(&self, key: &str, value: &serde_json::Value, timestamp: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_status (key, value, timestamp) VALUES (?1, ?2, ?3)",
            params![key, serde_json::to_string(value)?, timestamp],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<SyncStatusEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, value, timestamp FROM sync_status WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, value, timestamp)| decode(key, &value, timestamp))
            .transpose()
    }

    fn list(&self) -> Result<Vec<SyncStatusEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, timestamp FROM sync_status ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, value, timestamp)| {
                decode(key, &value, timestamp)
                    .map_err(|error| tracing::warn!("Skipping sync status: {}", error))
                    .ok()
            })
            .collect())
    }
}
