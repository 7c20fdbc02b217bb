//! Country and project mirror repository
//!
//! Rows are matched by natural key (`country_code`, `project_id`) through
//! `ON CONFLICT` upserts, so two processes pulling at the same time can never
//! produce a duplicate row for one remote entity.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::error::Result;
use crate::models::{Country, Project, RemoteCountry, RemoteProject, UpsertOutcome};

/// Trait for entity mirror storage operations
pub trait MirrorRepository {
    /// Insert or update a country by `country_code`
    fn upsert_country(&self, country: &RemoteCountry, synced_at: i64) -> Result<UpsertOutcome>;

    /// Insert or update a project by `project_id`
    fn upsert_project(&self, project: &RemoteProject, synced_at: i64) -> Result<UpsertOutcome>;

    fn get_country(&self, country_code: &str) -> Result<Option<Country>>;

    fn get_project(&self, project_id: &str) -> Result<Option<Project>>;

    /// List countries by name
    fn list_countries(&self, limit: usize) -> Result<Vec<Country>>;

    /// List projects by name
    fn list_projects(&self, limit: usize) -> Result<Vec<Project>>;

    fn count_countries(&self) -> Result<usize>;

    fn count_projects(&self) -> Result<usize>;
}

/// `SQLite` implementation of `MirrorRepository`
pub struct SqliteMirrorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteMirrorRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_country(row: &Row<'_>) -> rusqlite::Result<Country> {
        Ok(Country {
            local_id: row.get(0)?,
            country_code: row.get(1)?,
            country_name: row.get(2)?,
            region: row.get(3)?,
            gdp_usd: row.get(4)?,
            contribution_usd: row.get(5)?,
            covenant_status: row.get(6)?,
            joined_at: row.get(7)?,
            last_synced_at: row.get(8)?,
        })
    }

    fn parse_project(row: &Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            local_id: row.get(0)?,
            project_id: row.get(1)?,
            project_name: row.get(2)?,
            sector: row.get(3)?,
            country_id: row.get(4)?,
            status: row.get(5)?,
            budget_usd: row.get(6)?,
            impact_score: row.get(7)?,
            created_at: row.get(8)?,
            last_synced_at: row.get(9)?,
        })
    }

    fn count(&self, table: &str) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Take the write lock up front so the existence check and the upsert
    /// wait on `busy_timeout` together instead of failing on upgrade.
    fn begin_write(&self) -> Result<Transaction<'a>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn exists(&self, sql: &str, key: &str) -> Result<bool> {
        Ok(self
            .conn
            .query_row(sql, params![key], |_| Ok(()))
            .optional()?
            .is_some())
    }
}

const COUNTRY_COLUMNS: &str = "local_id, country_code, country_name, region, gdp_usd, \
     contribution_usd, covenant_status, joined_at, last_synced_at";

const PROJECT_COLUMNS: &str = "local_id, project_id, project_name, sector, country_id, status, \
     budget_usd, impact_score, created_at, last_synced_at";

impl MirrorRepository for SqliteMirrorRepository<'_> {
    fn upsert_country(&self, country: &RemoteCountry, synced_at: i64) -> Result<UpsertOutcome> {
        let tx = self.begin_write()?;
        let existed = self.exists(
            "SELECT 1 FROM countries WHERE country_code = ?1",
            &country.country_code,
        )?;

        tx.execute(
            "INSERT INTO countries (
                country_code, country_name, region, gdp_usd, contribution_usd,
                covenant_status, joined_at, last_synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(country_code) DO UPDATE SET
                country_name = excluded.country_name,
                region = excluded.region,
                gdp_usd = excluded.gdp_usd,
                contribution_usd = excluded.contribution_usd,
                covenant_status = excluded.covenant_status,
                last_synced_at = excluded.last_synced_at",
            params![
                country.country_code,
                country.name,
                country.region,
                country.gdp_usd,
                country.contribution_usd,
                country.covenant_status,
                country.joined_at.map(|at| at.timestamp_millis()),
                synced_at
            ],
        )?;
        tx.commit()?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn upsert_project(&self, project: &RemoteProject, synced_at: i64) -> Result<UpsertOutcome> {
        let tx = self.begin_write()?;
        let existed = self.exists("SELECT 1 FROM projects WHERE project_id = ?1", &project.id)?;

        tx.execute(
            "INSERT INTO projects (
                project_id, project_name, sector, country_id, status,
                budget_usd, impact_score, created_at, last_synced_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(project_id) DO UPDATE SET
                project_name = excluded.project_name,
                sector = excluded.sector,
                country_id = excluded.country_id,
                status = excluded.status,
                budget_usd = excluded.budget_usd,
                impact_score = excluded.impact_score,
                last_synced_at = excluded.last_synced_at",
            params![
                project.id,
                project.name,
                project.sector,
                project.country_id,
                project.status,
                project.budget_usd,
                project.impact_score,
                project.created_at.map(|at| at.timestamp_millis()),
                synced_at
            ],
        )?;
        tx.commit()?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_country(&self, country_code: &str) -> Result<Option<Country>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE country_code = ?1"),
                params![country_code],
                Self::parse_country,
            )
            .optional()?)
    }

    fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
                params![project_id],
                Self::parse_project,
            )
            .optional()?)
    }

    fn list_countries(&self, limit: usize) -> Result<Vec<Country>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries ORDER BY country_name ASC LIMIT ?1"
        ))?;
        let countries = stmt
            .query_map(params![limit as i64], Self::parse_country)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(countries)
    }

    fn list_projects(&self, limit: usize) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY project_name ASC LIMIT ?1"
        ))?;
        let projects = stmt
            .query_map(params![limit as i64], Self::parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn count_countries(&self) -> Result<usize> {
        self.count("countries")
    }

    fn count_projects(&self) -> Result<usize> {
        self.count("projects")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn kenya(name: &str) -> RemoteCountry {
        RemoteCountry {
            country_code: "KE".to_string(),
            name: name.to_string(),
            region: Some("Africa".to_string()),
            gdp_usd: Some(1.0e11),
            contribution_usd: Some(5.0e6),
            covenant_status: Some("ratified".to_string()),
            joined_at: "2024-01-01T00:00:00Z".parse().ok(),
        }
    }

    #[test]
    fn test_concurrent_upserts_from_two_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.db");
        Database::open(&path).unwrap();

        let writers = (0..2)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let db = Database::open(&path).unwrap();
                    let repo = SqliteMirrorRepository::new(db.connection());
                    for index in 0..100 {
                        let mut country = kenya(&format!("writer {writer}"));
                        country.country_code = format!("C{index:03}");
                        repo.upsert_country(&country, index).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for writer in writers {
            writer.join().unwrap();
        }

        let db = Database::open(&path).unwrap();
        let repo = SqliteMirrorRepository::new(db.connection());
        assert_eq!(repo.count_countries().unwrap(), 100);
    }

    #[test]
    fn test_upsert_country_updates_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteMirrorRepository::new(db.connection());

        assert_eq!(
            repo.upsert_country(&kenya("Kenya"), 100).unwrap(),
            UpsertOutcome::Inserted
        );
        let first = repo.get_country("KE").unwrap().unwrap();

        let mut renamed = kenya("Republic of Kenya");
        renamed.joined_at = None;
        assert_eq!(
            repo.upsert_country(&renamed, 200).unwrap(),
            UpsertOutcome::Updated
        );

        let second = repo.get_country("KE").unwrap().unwrap();
        assert_eq!(second.local_id, first.local_id);
        assert_eq!(second.country_name, "Republic of Kenya");
        assert_eq!(second.last_synced_at, 200);
        // joined_at is only written on first insert
        assert_eq!(second.joined_at, first.joined_at);
        assert_eq!(repo.count_countries().unwrap(), 1);
    }

    #[test]
    fn test_upsert_project_inserts_unseen_key() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteMirrorRepository::new(db.connection());

        let project = RemoteProject {
            id: "p-1".to_string(),
            name: "Well A".to_string(),
            sector: Some("water".to_string()),
            country_id: Some("KE".to_string()),
            status: Some("active".to_string()),
            budget_usd: Some(10_000.0),
            impact_score: Some(7.5),
            created_at: None,
        };
        repo.upsert_project(&project, 1).unwrap();
        let mut other = project.clone();
        other.id = "p-2".to_string();
        repo.upsert_project(&other, 1).unwrap();

        assert_eq!(repo.count_projects().unwrap(), 2);
        let listed = repo.list_projects(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].local_id, listed[1].local_id);
    }
}
