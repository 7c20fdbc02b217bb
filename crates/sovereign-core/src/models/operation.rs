//! Queued operation model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of failed replays after which an operation becomes terminal-failed
pub const MAX_RETRIES: u32 = 3;

/// HTTP verb recorded for a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unsupported HTTP method '{other}'"
            ))),
        }
    }
}

/// Mutation intent as expressed by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// The HTTP verb this action is replayed with
    pub const fn method(self) -> HttpMethod {
        match self {
            Self::Create => HttpMethod::Post,
            Self::Update => HttpMethod::Put,
            Self::Delete => HttpMethod::Delete,
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown action '{other}'"))),
        }
    }
}

/// Lifecycle status of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting to be replayed on the next cycle
    Pending,
    /// Exhausted its retries; kept for inspection, never replayed again
    Failed,
}

impl OperationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Malformed(format!(
                "unknown operation status '{other}'"
            ))),
        }
    }
}

/// An operation about to be enqueued; the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOperation {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Creation time (Unix ms)
    pub timestamp: i64,
}

impl NewOperation {
    /// Create an operation stamped with the current time
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build the REST-shaped request for a create/update/delete on a collection.
    ///
    /// `record_id` is required for updates and deletes. JSON payloads get a
    /// `Content-Type` header; deletes never carry a body.
    pub fn for_action(
        action: Action,
        collection: &str,
        record_id: Option<&str>,
        payload: Option<&serde_json::Value>,
    ) -> Result<Self, Error> {
        let collection = collection.trim().trim_matches('/');
        if collection.is_empty() {
            return Err(Error::InvalidInput("collection must not be empty".into()));
        }

        let url = match action {
            Action::Create => format!("/{collection}"),
            Action::Update | Action::Delete => {
                let record_id = record_id
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "{} on '{collection}' requires a record id",
                            action.method()
                        ))
                    })?;
                format!("/{collection}/{record_id}")
            }
        };

        let mut operation = Self::new(action.method(), url);
        if action != Action::Delete {
            if let Some(payload) = payload {
                operation.body = Some(serde_json::to_string(payload)?);
                operation
                    .headers
                    .insert("Content-Type".to_string(), "application/json".to_string());
            }
        }
        Ok(operation)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A durable record of one not-yet-confirmed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Store-assigned, strictly increasing
    pub id: i64,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Creation time (Unix ms)
    pub timestamp: i64,
    /// Failed replay attempts so far
    pub retries: u32,
    pub status: OperationStatus,
    /// Reason for the most recent replay failure
    pub last_error: Option<String>,
}

impl QueuedOperation {
    pub const fn is_terminal(&self) -> bool {
        matches!(self.status, OperationStatus::Failed)
    }
}

/// Result of recording one failed replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    pub retries: u32,
    pub status: OperationStatus,
}

impl FailureRecord {
    pub const fn became_terminal(&self) -> bool {
        matches!(self.status, OperationStatus::Failed)
    }
}
