//! Access-token boundary used by the sync engine.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::util::normalize_text_option;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Session expired; sign in again")]
    Expired,
    #[error("Session storage error: {0}")]
    Storage(String),
    #[error("Failed to parse session: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Supplies bearer tokens and reacts when the server rejects them.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn access_token(&self) -> AuthResult<String>;

    /// Called after a 401/403; implementations drop the credential.
    async fn on_unauthorized(&self);
}

/// A fixed token from configuration or the command line.
pub struct StaticTokenAuth {
    token: RwLock<Option<String>>,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(normalize_text_option(Some(token.into()))),
        }
    }

    /// Provider with no credential; every cycle reports unauthorized.
    pub fn anonymous() -> Self {
        Self {
            token: RwLock::new(None),
        }
    }
}

impl fmt::Debug for StaticTokenAuth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticTokenAuth")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn access_token(&self) -> AuthResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotAuthenticated)
    }

    async fn on_unauthorized(&self) {
        tracing::warn!("Access token rejected by the server; discarding it");
        *self.token.write().await = None;
    }
}

/// Persisted sign-in state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    /// Unix seconds; `None` for tokens without an expiry
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + EXPIRY_SKEW_SECONDS)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("email", &self.email)
            .finish()
    }
}

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AuthError::Storage(format!(
                "cannot read {}: {error}",
                self.path.display()
            ))),
        }
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                AuthError::Storage(format!("cannot create {}: {error}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, raw).map_err(|error| {
            AuthError::Storage(format!("cannot write {}: {error}", self.path.display()))
        })
    }

    fn clear_session(&self) -> AuthResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AuthError::Storage(format!(
                "cannot remove {}: {error}",
                self.path.display()
            ))),
        }
    }
}

/// [`AuthProvider`] backed by a persisted session.
#[derive(Debug, Clone)]
pub struct SessionAuth<S: SessionPersistence> {
    store: S,
}

pub type FileSessionAuth = SessionAuth<FileSessionStore>;

impl<S: SessionPersistence> SessionAuth<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub fn sign_in(&self, session: &AuthSession) -> AuthResult<()> {
        if session.access_token.trim().is_empty() {
            return Err(AuthError::NotAuthenticated);
        }
        self.store.save_session(session)
    }

    pub fn sign_out(&self) -> AuthResult<()> {
        self.store.clear_session()
    }

    pub fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        self.store.load_session()
    }
}

impl FileSessionAuth {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSessionStore::new(path))
    }
}

#[async_trait]
impl<S: SessionPersistence> AuthProvider for SessionAuth<S> {
    async fn access_token(&self) -> AuthResult<String> {
        let session = self
            .store
            .load_session()?
            .ok_or(AuthError::NotAuthenticated)?;
        if session.is_expired() {
            return Err(AuthError::Expired);
        }
        Ok(session.access_token)
    }

    async fn on_unauthorized(&self) {
        tracing::warn!("Session rejected by the server; signing out");
        if let Err(error) = self.store.clear_session() {
            tracing::warn!("Failed to clear persisted session: {}", error);
        }
    }
}
