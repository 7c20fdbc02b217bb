//! Remote REST API boundary.
//!
//! The sync engine talks to the server only through [`RemoteApi`]. The
//! production implementation is [`HttpRemote`]; tests substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::models::{HttpMethod, QueuedOperation};
use crate::util::{compact_text, is_http_url, join_url, normalize_text_option};

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection refused, DNS failure, timeout
    #[error("Remote unreachable: {0}")]
    Unreachable(String),
    /// 401/403 from the server
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Remote API error: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid response payload: {0}")]
    Decode(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else if error.is_builder() {
            Self::InvalidConfiguration(error.to_string())
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}

impl From<RemoteError> for crate::Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unreachable(message) => Self::NetworkUnreachable(message),
            RemoteError::Unauthorized(message) => Self::Unauthorized(message),
            RemoteError::Status { message, .. } => Self::Remote(message),
            RemoteError::Decode(message) => Self::Malformed(message),
            RemoteError::InvalidConfiguration(message) => Self::Config(message),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD + health contract of the remote API.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET /health`; `Ok` means the server answered with a 2xx.
    async fn health_check(&self, token: Option<&str>) -> RemoteResult<()>;

    /// Replay one queued mutation exactly as it was recorded.
    async fn replay(&self, operation: &QueuedOperation, token: &str) -> RemoteResult<()>;

    /// `GET /{collection}` returning the raw records.
    async fn fetch_collection(
        &self,
        collection: &str,
        token: &str,
    ) -> RemoteResult<Vec<serde_json::Value>>;
}

/// reqwest-backed [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemote {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &ClientConfig) -> RemoteResult<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request.header("Accept", "application/json").send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            Err(RemoteError::Unauthorized(message))
        } else {
            Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn health_check(&self, token: Option<&str>) -> RemoteResult<()> {
        let mut request = self.client.get(join_url(&self.base_url, HEALTH_PATH));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.send(request).await.map(|_| ())
    }

    async fn replay(&self, operation: &QueuedOperation, token: &str) -> RemoteResult<()> {
        let url = join_url(&self.base_url, &operation.url);
        let mut request = self
            .client
            .request(to_reqwest_method(operation.method), url)
            .bearer_auth(token);

        // the stored credential may be stale; the current token wins
        for (name, value) in &operation.headers {
            if !name.eq_ignore_ascii_case("authorization") {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = &operation.body {
            request = request.body(body.clone());
        }

        tracing::debug!(
            "Replaying operation {} ({} {})",
            operation.id,
            operation.method,
            operation.url
        );
        self.send(request).await.map(|_| ())
    }

    async fn fetch_collection(
        &self,
        collection: &str,
        token: &str,
    ) -> RemoteResult<Vec<serde_json::Value>> {
        let request = self
            .client
            .get(join_url(&self.base_url, collection))
            .bearer_auth(token);
        let response = self.send(request).await?;
        let body = response.json::<CollectionBody>().await?;
        Ok(body.into_records())
    }
}

/// Either a bare array or a `{ "data": [...] }` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollectionBody {
    Records(Vec<serde_json::Value>),
    Envelope { data: Vec<serde_json::Value> },
}

impl CollectionBody {
    fn into_records(self) -> Vec<serde_json::Value> {
        match self {
            Self::Records(records) | Self::Envelope { data: records } => records,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

const fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}
