//! Database migrations
//!
//! Migrations are additive only: each version creates what is missing and
//! never rewrites existing rows, so a store written by an older client (or by
//! the background task running a different build) stays readable.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated store to version {version}");
    Ok(())
}

/// Migration to version 1: queue, content cache and sync status collections
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // AUTOINCREMENT keeps ids strictly increasing even after deletes
            "CREATE TABLE IF NOT EXISTS queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                headers TEXT NOT NULL DEFAULT '{}',
                body TEXT,
                timestamp INTEGER NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                last_error TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_queue_timestamp ON queue(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_queue_status ON queue(status)",
            "CREATE TABLE IF NOT EXISTS content (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                data TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_content_type ON content(type)",
            "CREATE INDEX IF NOT EXISTS idx_content_expires_at ON content(expires_at)",
            "CREATE TABLE IF NOT EXISTS sync_status (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
        ],
    )
}

/// Migration to version 2: country and project mirrors
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS countries (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                country_code TEXT NOT NULL UNIQUE,
                country_name TEXT NOT NULL,
                region TEXT,
                gdp_usd REAL,
                contribution_usd REAL,
                covenant_status TEXT,
                joined_at INTEGER,
                last_synced_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_countries_region ON countries(region)",
            "CREATE TABLE IF NOT EXISTS projects (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL UNIQUE,
                project_name TEXT NOT NULL,
                sector TEXT,
                country_id TEXT,
                status TEXT,
                budget_usd REAL,
                impact_score REAL,
                created_at INTEGER,
                last_synced_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_projects_sector ON projects(sector)",
            "CREATE INDEX IF NOT EXISTS idx_projects_country ON projects(country_id)",
            "CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status)",
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        for table in ["queue", "content", "sync_status", "countries", "projects"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn upgrade_from_v1_keeps_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO queue (url, method, timestamp) VALUES ('/projects', 'POST', 1)",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(table_exists(&conn, "countries"));
    }
}
