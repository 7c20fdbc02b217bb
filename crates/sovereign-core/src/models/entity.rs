//! Local mirrors of remote entities, keyed by natural key

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Country as returned by `GET /countries`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCountry {
    pub country_code: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gdp_usd: Option<f64>,
    #[serde(default)]
    pub contribution_usd: Option<f64>,
    #[serde(default)]
    pub covenant_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub joined_at: Option<DateTime<Utc>>,
}

/// Project as returned by `GET /projects`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProject {
    /// Remote id, used locally as the natural key `project_id`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub country_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub budget_usd: Option<f64>,
    #[serde(default)]
    pub impact_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339, a naive date-time, a bare date (UTC midnight) or epoch
/// milliseconds. Anything else decodes as `None` so the record still mirrors.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = value.as_ref().and_then(parse_timestamp);
    if parsed.is_none() && value.as_ref().is_some_and(|value| !value.is_null()) {
        tracing::debug!("Ignoring unparseable timestamp {:?}", value);
    }
    Ok(parsed)
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(text) => {
            let text = text.trim();
            DateTime::parse_from_rfc3339(text)
                .map(|at| at.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
        }
        serde_json::Value::Number(number) => {
            number.as_i64().and_then(DateTime::from_timestamp_millis)
        }
        _ => None,
    }
}

/// Local country row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    /// Local auto-increment id, never used for matching
    pub local_id: i64,
    pub country_code: String,
    pub country_name: String,
    pub region: Option<String>,
    pub gdp_usd: Option<f64>,
    pub contribution_usd: Option<f64>,
    pub covenant_status: Option<String>,
    /// Set on first insert only (Unix ms)
    pub joined_at: Option<i64>,
    /// Unix ms
    pub last_synced_at: i64,
}

/// Local project row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub local_id: i64,
    pub project_id: String,
    pub project_name: String,
    pub sector: Option<String>,
    pub country_id: Option<String>,
    pub status: Option<String>,
    pub budget_usd: Option<f64>,
    pub impact_score: Option<f64>,
    pub created_at: Option<i64>,
    pub last_synced_at: i64,
}

/// Whether an upsert touched an existing row or created one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Counters reported after mirroring one remote collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MirrorStats {
    pub(crate) fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.inserted + self.updated
    }
}
