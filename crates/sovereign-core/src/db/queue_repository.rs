//! Operation queue repository

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{
    FailureRecord, HttpMethod, NewOperation, OperationStatus, QueuedOperation, MAX_RETRIES,
};

/// Trait for queue storage operations
pub trait QueueRepository {
    /// Append an operation and return its store-assigned id
    fn add(&self, operation: &NewOperation) -> Result<i64>;

    /// Get an operation by id, whatever its status
    fn get(&self, id: i64) -> Result<Option<QueuedOperation>>;

    /// List operations with the given status in insertion order
    fn list_by_status(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>>;

    /// Delete one operation; deleting an absent id is not an error
    fn delete(&self, id: i64) -> Result<()>;

    /// Increment the retry counter, flipping to failed at the ceiling
    fn record_failure(&self, id: i64, reason: &str) -> Result<Option<FailureRecord>>;

    /// Put a failed operation back into the pending set with a fresh counter
    fn requeue(&self, id: i64) -> Result<bool>;

    /// Delete every operation
    fn clear(&self) -> Result<usize>;

    /// Count operations with the given status
    fn count(&self, status: OperationStatus) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &Row<'_>) -> rusqlite::Result<RawOperation> {
        Ok(RawOperation {
            id: row.get(0)?,
            url: row.get(1)?,
            method: row.get(2)?,
            headers: row.get(3)?,
            body: row.get(4)?,
            timestamp: row.get(5)?,
            retries: row.get(6)?,
            status: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    /// Decode raw rows, deleting the ones that no longer parse.
    fn decode_all(&self, rows: Vec<RawOperation>) -> Result<Vec<QueuedOperation>> {
        let mut operations = Vec::with_capacity(rows.len());
        for raw in rows {
            let id = raw.id;
            match raw.decode() {
                Ok(operation) => operations.push(operation),
                Err(error) => {
                    tracing::warn!("Dropping malformed queue entry {}: {}", id, error);
                    self.delete(id)?;
                }
            }
        }
        Ok(operations)
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, url, method, headers, body, timestamp, retries, status, last_error FROM queue";

struct RawOperation {
    id: i64,
    url: String,
    method: String,
    headers: String,
    body: Option<String>,
    timestamp: i64,
    retries: i64,
    status: String,
    last_error: Option<String>,
}

impl RawOperation {
    fn decode(self) -> Result<QueuedOperation> {
        let method = self
            .method
            .parse::<HttpMethod>()
            .map_err(|error| Error::Malformed(error.to_string()))?;
        let headers = serde_json::from_str::<BTreeMap<String, String>>(&self.headers)
            .map_err(|error| Error::Malformed(format!("headers: {error}")))?;
        let retries = u32::try_from(self.retries)
            .map_err(|_| Error::Malformed(format!("retries out of range: {}", self.retries)))?;

        Ok(QueuedOperation {
            id: self.id,
            url: self.url,
            method,
            headers,
            body: self.body,
            timestamp: self.timestamp,
            retries,
            status: self.status.parse()?,
            last_error: self.last_error,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn add(&self, operation: &NewOperation) -> Result<i64> {
        if operation.url.trim().is_empty() {
            return Err(Error::InvalidInput("operation url must not be empty".into()));
        }

        let headers = serde_json::to_string(&operation.headers)?;
        self.conn.execute(
            "INSERT INTO queue (url, method, headers, body, timestamp, retries, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 'pending')",
            params![
                operation.url,
                operation.method.as_str(),
                headers,
                operation.body,
                operation.timestamp
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<QueuedOperation>> {
        let raw = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                Self::parse_row,
            )
            .optional()?;

        Ok(self.decode_all(raw.into_iter().collect())?.pop())
    }

    fn list_by_status(&self, status: OperationStatus) -> Result<Vec<QueuedOperation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id ASC"))?;

        let rows = stmt
            .query_map(params![status.as_str()], Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.decode_all(rows)
    }

    fn delete(&self, id: i64) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM queue WHERE id = ?1", params![id])?;
        if rows == 0 {
            tracing::debug!("Queue entry {} already removed", id);
        }
        Ok(())
    }

    fn record_failure(&self, id: i64, reason: &str) -> Result<Option<FailureRecord>> {
        let record = self
            .conn
            .query_row(
                "UPDATE queue
                 SET retries = retries + 1,
                     last_error = ?2,
                     status = CASE WHEN retries + 1 >= ?3 THEN 'failed' ELSE status END
                 WHERE id = ?1 AND status = 'pending'
                 RETURNING retries, status",
                params![id, reason, MAX_RETRIES],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        record
            .map(|(retries, status)| {
                Ok(FailureRecord {
                    retries: u32::try_from(retries).unwrap_or(u32::MAX),
                    status: status.parse()?,
                })
            })
            .transpose()
    }

    fn requeue(&self, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE queue SET status = 'pending', retries = 0, last_error = NULL
             WHERE id = ?1 AND status = 'failed'",
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM queue", [])?)
    }

    fn count(&self, status: OperationStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM queue WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn post(url: &str) -> NewOperation {
        NewOperation::new(HttpMethod::Post, url).with_body(r#"{"name":"Well A"}"#)
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = repo.add(&post("/projects")).unwrap();
        repo.delete(first).unwrap();
        let second = repo.add(&post("/projects")).unwrap();

        assert!(second > first, "ids must never be reused");
    }

    #[test]
    fn test_list_pending_in_insertion_order() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        for url in ["/a", "/b", "/c"] {
            repo.add(&post(url)).unwrap();
        }

        let urls = repo
            .list_by_status(OperationStatus::Pending)
            .unwrap()
            .into_iter()
            .map(|op| op.url)
            .collect::<Vec<_>>();
        assert_eq!(urls, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let id = repo.add(&post("/projects")).unwrap();
        repo.delete(id).unwrap();
        repo.delete(id).unwrap();
        repo.delete(9_999).unwrap();

        assert!(repo.get(id).unwrap().is_none());
    }

    #[test]
    fn test_record_failure_reaches_terminal_at_ceiling() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        let id = repo.add(&post("/projects")).unwrap();

        let first = repo.record_failure(id, "timeout").unwrap().unwrap();
        let second = repo.record_failure(id, "timeout").unwrap().unwrap();
        let third = repo.record_failure(id, "HTTP 500").unwrap().unwrap();

        assert_eq!(first.retries, 1);
        assert!(!second.became_terminal());
        assert_eq!(third.retries, MAX_RETRIES);
        assert!(third.became_terminal());

        assert!(repo.list_by_status(OperationStatus::Pending).unwrap().is_empty());
        let failed = repo.list_by_status(OperationStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("HTTP 500"));

        // terminal entries are not touched again
        assert!(repo.record_failure(id, "again").unwrap().is_none());
    }

    #[test]
    fn test_record_failure_on_missing_row() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        assert!(repo.record_failure(42, "gone").unwrap().is_none());
    }

    #[test]
    fn test_requeue_only_failed() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        let id = repo.add(&post("/projects")).unwrap();

        assert!(!repo.requeue(id).unwrap());
        for _ in 0..MAX_RETRIES {
            repo.record_failure(id, "HTTP 500").unwrap();
        }
        assert!(repo.requeue(id).unwrap());

        let op = repo.get(id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retries, 0);
        assert_eq!(op.last_error, None);
    }

    #[test]
    fn test_malformed_rows_are_dropped() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        repo.add(&post("/good")).unwrap();
        db.connection()
            .execute(
                "INSERT INTO queue (url, method, headers, timestamp) VALUES ('/bad', 'POST', 'not json', 1)",
                [],
            )
            .unwrap();

        let pending = repo.list_by_status(OperationStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "/good");

        let total: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_clear_and_count() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());
        repo.add(&post("/a")).unwrap();
        repo.add(&post("/b")).unwrap();

        assert_eq!(repo.count(OperationStatus::Pending).unwrap(), 2);
        assert_eq!(repo.clear().unwrap(), 2);
        assert_eq!(repo.count(OperationStatus::Pending).unwrap(), 0);
    }
}
