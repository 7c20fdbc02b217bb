use serde::Serialize;
use sovereign_core::sync::LAST_SYNC_KEY;
use sovereign_core::util::now_millis;
use sovereign_core::StoreStats;

use crate::commands::common::{format_relative_time, format_timestamp, print_json, CliContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub api_base_url: String,
    pub signed_in: bool,
    pub last_sync: Option<i64>,
    #[serde(flatten)]
    pub stats: StoreStats,
}

pub async fn run_status(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let store = context.open_store().await?;
    let stats = store.stats().await?;
    let last_sync = store
        .get_sync_status(LAST_SYNC_KEY)
        .await?
        .and_then(|entry| entry.value.as_i64());
    let signed_in = context.config.access_token.is_some()
        || context.session_auth().current_session()?.is_some();

    let report = StatusReport {
        db_path: context.db_path.display().to_string(),
        api_base_url: context.config.api_base_url.clone(),
        signed_in,
        last_sync,
        stats,
    };

    if as_json {
        return print_json(&report);
    }

    for line in format_status_lines(&report, now_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport, now_ms: i64) -> Vec<String> {
    let last_sync = report.last_sync.map_or_else(
        || "never".to_string(),
        |at| format!("{} ({})", format_timestamp(at), format_relative_time(at, now_ms)),
    );

    vec![
        format!("Store:      {}", report.db_path),
        format!("API:        {}", report.api_base_url),
        format!("Signed in:  {}", if report.signed_in { "yes" } else { "no" }),
        format!("Last sync:  {last_sync}"),
        format!(
            "Queue:      {} pending, {} failed",
            report.stats.pending_operations, report.stats.failed_operations
        ),
        format!("Cache:      {} entries", report.stats.cached_entries),
        format!(
            "Mirrors:    {} countries, {} projects",
            report.stats.countries, report.stats.projects
        ),
    ]
}
