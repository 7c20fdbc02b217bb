//! Client configuration.
//!
//! `ClientConfig` is read from an optional JSON file and then overridden by
//! `SOVEREIGN_*` environment variables. Every field has a default, so an empty
//! file (or no file) yields a usable configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.globalsovereign.org";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REALTIME_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_REALTIME_MAX_ATTEMPTS: u32 = 5;

pub const ENV_API_BASE_URL: &str = "SOVEREIGN_API_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "SOVEREIGN_ACCESS_TOKEN";
pub const ENV_SYNC_INTERVAL_SECS: &str = "SOVEREIGN_SYNC_INTERVAL_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "SOVEREIGN_CACHE_TTL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SOVEREIGN_REQUEST_TIMEOUT_SECS";

/// Runtime settings shared by the sync engine, scheduler and HTTP remote.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Static bearer token; usually supplied through the environment.
    pub access_token: Option<String>,
    pub sync_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub realtime_base_delay_ms: u64,
    pub realtime_max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            realtime_base_delay_ms: DEFAULT_REALTIME_BASE_DELAY_MS,
            realtime_max_attempts: DEFAULT_REALTIME_MAX_ATTEMPTS,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("realtime_base_delay_ms", &self.realtime_base_delay_ms)
            .field("realtime_max_attempts", &self.realtime_max_attempts)
            .finish()
    }
}

impl ClientConfig {
    /// Load the file at `path` (if it exists), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_json(&raw).map_err(|error| {
                    Error::Config(format!("{}: {error}", path.display()))
                })?
            }
            _ => Self::default(),
        };

        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validated()
    }

    /// Apply `SOVEREIGN_*` overrides looked up through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(url) = read(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(token) = read(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(value) = read(ENV_SYNC_INTERVAL_SECS) {
            self.sync_interval_secs = parse_secs(ENV_SYNC_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = read(ENV_CACHE_TTL_SECS) {
            self.cache_ttl_secs = parse_secs(ENV_CACHE_TTL_SECS, &value)?;
        }
        if let Some(value) = read(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_secs(ENV_REQUEST_TIMEOUT_SECS, &value)?;
        }

        self.validated()
    }

    fn validated(mut self) -> Result<Self> {
        let url = normalize_text_option(Some(self.api_base_url))
            .ok_or_else(|| Error::Config("api_base_url is required".to_string()))?;
        if !is_http_url(&url) {
            return Err(Error::Config(format!(
                "api_base_url must include http:// or https:// (got '{url}')"
            )));
        }
        self.api_base_url = url.trim_end_matches('/').to_string();
        self.access_token = normalize_text_option(self.access_token);

        for (field, value) in [
            ("sync_interval_secs", self.sync_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }

        Ok(self)
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn realtime_base_delay(&self) -> Duration {
        Duration::from_millis(self.realtime_base_delay_ms)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = ClientConfig::from_json(r#"{"supabase_url": "x"}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config =
            ClientConfig::from_json(r#"{"api_base_url": " https://api.example.com/ "}"#).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let error = ClientConfig::from_json(r#"{"api_base_url": "api.example.com"}"#).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let config = ClientConfig::from_json(r#"{"sync_interval_secs": 60}"#)
            .unwrap()
            .with_env_overrides(env(&[
                (ENV_API_BASE_URL, "http://localhost:8080"),
                (ENV_ACCESS_TOKEN, "  token-123 "),
                (ENV_SYNC_INTERVAL_SECS, "15"),
                (ENV_CACHE_TTL_SECS, ""),
            ]))
            .unwrap();

        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.access_token.as_deref(), Some("token-123"));
        assert_eq!(config.sync_interval_secs, 15);
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn env_rejects_garbage_numbers() {
        let error = ClientConfig::default()
            .with_env_overrides(env(&[(ENV_REQUEST_TIMEOUT_SECS, "soon")]))
            .unwrap_err();
        assert!(error.to_string().contains(ENV_REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let error = ClientConfig::from_json(r#"{"sync_interval_secs": 0}"#).unwrap_err();
        assert!(error.to_string().contains("sync_interval_secs"));
    }

    #[test]
    fn debug_redacts_token() {
        let config = ClientConfig {
            access_token: Some("secret-token".to_string()),
            ..ClientConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        // process env may carry overrides; only the file fallback is asserted
        let config = ClientConfig::load(Some(&path)).unwrap();
        assert!(is_http_url(&config.api_base_url));
    }
}
