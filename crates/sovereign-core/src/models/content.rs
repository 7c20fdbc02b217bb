//! Cached content and sync status models

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Last-known-good server payload kept for offline reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedContent {
    /// Semantic key, e.g. `countries:all`
    pub id: String,
    /// Category tag used for bulk lookup
    #[serde(rename = "type")]
    pub content_type: String,
    pub data: serde_json::Value,
    /// Last refresh (Unix ms)
    pub timestamp: i64,
    /// Absolute expiry (Unix ms)
    pub expires_at: i64,
}

impl CachedContent {
    /// Build an entry refreshed at `now` that lives for `ttl`.
    pub fn with_ttl(
        id: impl Into<String>,
        content_type: impl Into<String>,
        data: serde_json::Value,
        now: i64,
        ttl: Duration,
    ) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            id: id.into(),
            content_type: content_type.into(),
            data,
            timestamp: now,
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    pub const fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("cache id must not be empty".into()));
        }
        if self.expires_at <= self.timestamp {
            return Err(Error::InvalidInput(format!(
                "cache entry '{}' expires at {} which is not after its timestamp {}",
                self.id, self.expires_at, self.timestamp
            )));
        }
        Ok(())
    }
}

/// Last-successful-sync marker for one logical resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusEntry {
    pub key: String,
    pub value: serde_json::Value,
    /// Write time (Unix ms)
    pub timestamp: i64,
}
