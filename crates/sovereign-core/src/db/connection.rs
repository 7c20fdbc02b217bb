//! Database connection management

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::migrations;
use crate::error::{Error, Result};

/// How long a writer waits for another process holding the lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrapper around the `SQLite` connection backing the durable store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the store file at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|error| {
            Error::StorageUnavailable(format!("cannot open {}: {error}", path.display()))
        })?;

        let database = Self { conn };
        database.configure(true)?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;

        let database = Self { conn };
        database.configure(false)?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for two processes sharing one file
    fn configure(&self, file_backed: bool) -> Result<()> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        if file_backed {
            // WAL lets the background task read while the app writes
            match self
                .conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                }) {
                Ok(mode) => tracing::debug!("Store journal mode: {}", mode),
                Err(error) => tracing::warn!("Could not enable WAL journal: {}", error),
            }
            self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
