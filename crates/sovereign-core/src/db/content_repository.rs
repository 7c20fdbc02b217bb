//! Content cache repository

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::CachedContent;

/// Trait for content cache storage operations
pub trait ContentRepository {
    /// Insert or replace an entry by id
    fn put(&self, content: &CachedContent) -> Result<()>;

    /// Get an entry by id regardless of expiry
    fn get(&self, id: &str) -> Result<Option<CachedContent>>;

    /// List entries of one type regardless of expiry
    fn list_by_type(&self, content_type: &str) -> Result<Vec<CachedContent>>;

    /// List every entry ordered by expiry
    fn list_all(&self) -> Result<Vec<CachedContent>>;

    /// Delete one entry; absent ids are ignored
    fn delete(&self, id: &str) -> Result<()>;

    /// Delete one entry only if it is still expired at `now`; false when a
    /// fresher write already replaced it
    fn delete_if_expired(&self, id: &str, now: i64) -> Result<bool>;

    /// Delete every entry that expired before `now`, returning how many went
    fn delete_expired(&self, now: i64) -> Result<usize>;

    /// Delete every entry
    fn clear(&self) -> Result<usize>;
}

/// `SQLite` implementation of `ContentRepository`
pub struct SqliteContentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteContentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &Row<'_>) -> rusqlite::Result<(CachedContent, String)> {
        Ok((
            CachedContent {
                id: row.get(0)?,
                content_type: row.get(1)?,
                data: serde_json::Value::Null,
                timestamp: row.get(3)?,
                expires_at: row.get(4)?,
            },
            row.get(2)?,
        ))
    }

    /// Attach decoded payloads, deleting entries whose payload is corrupt.
    fn decode_all(&self, rows: Vec<(CachedContent, String)>) -> Result<Vec<CachedContent>> {
        let mut contents = Vec::with_capacity(rows.len());
        for (mut content, data) in rows {
            match serde_json::from_str(&data) {
                Ok(value) => {
                    content.data = value;
                    contents.push(content);
                }
                Err(error) => {
                    tracing::warn!(
                        "Dropping malformed cache entry {}: {}",
                        content.id,
                        Error::Malformed(error.to_string())
                    );
                    // only the payload we read; a concurrent rewrite survives
                    self.conn.execute(
                        "DELETE FROM content WHERE id = ?1 AND data = ?2",
                        params![content.id, data],
                    )?;
                }
            }
        }
        Ok(contents)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<CachedContent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::parse_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        self.decode_all(rows)
    }
}

impl ContentRepository for SqliteContentRepository<'_> {
    fn put(&self, content: &CachedContent) -> Result<()> {
        content.validate()?;
        let data = serde_json::to_string(&content.data)?;

        self.conn.execute(
            "INSERT INTO content (id, type, data, timestamp, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                data = excluded.data,
                timestamp = excluded.timestamp,
                expires_at = excluded.expires_at",
            params![
                content.id,
                content.content_type,
                data,
                content.timestamp,
                content.expires_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CachedContent>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, type, data, timestamp, expires_at FROM content WHERE id = ?1",
                params![id],
                Self::parse_row,
            )
            .optional()?;

        Ok(self.decode_all(row.into_iter().collect())?.pop())
    }

    fn list_by_type(&self, content_type: &str) -> Result<Vec<CachedContent>> {
        self.query(
            "SELECT id, type, data, timestamp, expires_at FROM content
             WHERE type = ?1
             ORDER BY timestamp DESC",
            params![content_type],
        )
    }

    fn list_all(&self) -> Result<Vec<CachedContent>> {
        self.query(
            "SELECT id, type, data, timestamp, expires_at FROM content ORDER BY expires_at ASC",
            [],
        )
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM content WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn delete_if_expired(&self, id: &str, now: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM content WHERE id = ?1 AND expires_at < ?2",
            params![id, now],
        )?;
        Ok(removed > 0)
    }

    fn delete_expired(&self, now: i64) -> Result<usize> {
        // one statement, so the expiry check and the delete see the same row
        Ok(self
            .conn
            .execute("DELETE FROM content WHERE expires_at < ?1", params![now])?)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM content", [])?)
    }
}
