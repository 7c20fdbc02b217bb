use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use sovereign_core::auth::{AuthProvider, FileSessionAuth, StaticTokenAuth};
use sovereign_core::config::ClientConfig;
use sovereign_core::models::{CachedContent, QueuedOperation};
use sovereign_core::remote::{HttpRemote, RemoteApi};
use sovereign_core::{Store, StoreHandle, SyncEngine};

use crate::error::CliError;

const APP_DIR: &str = "sovereign";

#[derive(Debug, Serialize)]
pub struct OperationItem {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub retries: u32,
    pub status: String,
    pub last_error: Option<String>,
    pub queued_at: i64,
    pub relative_time: String,
}

/// Paths and settings resolved from the command line and environment.
pub struct CliContext {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub config: ClientConfig,
}

impl CliContext {
    pub fn resolve(
        cli_db_path: Option<PathBuf>,
        cli_config_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = cli_config_path.unwrap_or_else(default_config_path);
        Ok(Self {
            db_path: resolve_db_path(cli_db_path),
            session_path: default_session_path(),
            config: ClientConfig::load(Some(&config_path))?,
        })
    }

    pub fn store_handle(&self) -> StoreHandle {
        StoreHandle::file(self.db_path.clone())
    }

    pub async fn open_store(&self) -> Result<Store, CliError> {
        Ok(self.store_handle().open().await?)
    }

    pub fn session_auth(&self) -> FileSessionAuth {
        FileSessionAuth::from_path(self.session_path.clone())
    }

    /// A configured token wins over the stored session.
    pub fn auth_provider(&self) -> Arc<dyn AuthProvider> {
        match &self.config.access_token {
            Some(token) => Arc::new(StaticTokenAuth::new(token.clone())),
            None => Arc::new(self.session_auth()),
        }
    }

    pub fn remote(&self) -> Result<Arc<dyn RemoteApi>, CliError> {
        Ok(Arc::new(HttpRemote::from_config(&self.config)?))
    }

    pub async fn engine(&self) -> Result<SyncEngine, CliError> {
        let store = self.open_store().await?;
        Ok(
            SyncEngine::new(store, self.remote()?, self.auth_provider())
                .with_cache_ttl(self.config.cache_ttl()),
        )
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SOVEREIGN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("sovereign.db")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn default_session_path() -> PathBuf {
    config_dir().join("session.json")
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn parse_payload(raw: Option<&str>) -> Result<Option<serde_json::Value>, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|error| CliError::InvalidPayload(error.to_string()))
}

pub fn operation_to_item(operation: &QueuedOperation, now_ms: i64) -> OperationItem {
    OperationItem {
        id: operation.id,
        method: operation.method.to_string(),
        url: operation.url.clone(),
        retries: operation.retries,
        status: operation.status.as_str().to_string(),
        last_error: operation.last_error.clone(),
        queued_at: operation.timestamp,
        relative_time: format_relative_time(operation.timestamp, now_ms),
    }
}

pub fn format_operation_lines(operations: &[QueuedOperation], now_ms: i64) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let mut line = format!(
                "{:>5}  {:<6} {}  (retries {}, {})",
                operation.id,
                operation.method.as_str(),
                operation.url,
                operation.retries,
                format_relative_time(operation.timestamp, now_ms)
            );
            if let Some(error) = &operation.last_error {
                line.push_str(&format!("  last error: {error}"));
            }
            line
        })
        .collect()
}

pub fn format_cache_line(content: &CachedContent, now_ms: i64) -> String {
    format!(
        "{}  [{}]  refreshed {}, expires in {}",
        content.id,
        content.content_type,
        format_relative_time(content.timestamp, now_ms),
        format_remaining(content.expires_at, now_ms)
    )
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn format_remaining(expires_at_ms: i64, now_ms: i64) -> String {
    let left = expires_at_ms.saturating_sub(now_ms).max(0);
    let minute = 60_000;
    let hour = 60 * minute;

    if left < minute {
        format!("{}s", left / 1000)
    } else if left < hour {
        format!("{}m", left / minute)
    } else {
        format!("{}h", left / hour)
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
