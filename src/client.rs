//! Deployment service client.
//!
//! [`DeployClient`] is the seam the orchestrator depends on: a cached
//! credential plus one upload call. [`OperatorClient`] is the reqwest
//! implementation used by the CLI; tests substitute their own.

use crate::config::{InferexConfig, TOKEN_ENV};
use crate::errors::TransportError;
use crate::progress::UploadProgress;
use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const STATUS_OK: u16 = 200;
pub const STATUS_FORBIDDEN: u16 = 403;

/// Longest body excerpt shown to the operator for unexpected responses.
const MAX_DETAIL_CHARS: usize = 300;

/// Everything the service needs to accept one bundle.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub revision_id: &'a str,
    pub archive_path: &'a Path,
    pub target_dir: &'a Path,
}

/// An HTTP response, reduced to what the deploy flow inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == STATUS_FORBIDDEN
    }
}

#[async_trait]
pub trait DeployClient: Send + Sync {
    /// Token from the local credential cache, if one is present.
    fn cached_token(&self) -> Option<String>;

    /// Upload the archive, feeding byte progress into `progress`.
    ///
    /// A returned `ApiResponse` may carry any status; `Err` means no response
    /// was received at all.
    async fn deploy(
        &self,
        request: UploadRequest<'_>,
        progress: Arc<UploadProgress>,
    ) -> Result<ApiResponse, TransportError>;
}

#[derive(Debug, Deserialize)]
struct TokenFile {
    token: Option<String>,
}

/// Read the cached token from `token.json`.
///
/// A missing, unreadable, or malformed file counts as no token.
pub fn read_token_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let parsed: TokenFile = match serde_json::from_str(&content) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring malformed token file");
            return None;
        }
    };
    parsed.token.filter(|t| !t.trim().is_empty())
}

/// reqwest-backed client for the Inferex deployment API.
pub struct OperatorClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl OperatorClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("inferex/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token,
        })
    }

    /// Build a client from configuration. `INFEREX_TOKEN` wins over `token.json`.
    pub fn from_config(config: &InferexConfig) -> anyhow::Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| read_token_file(&config.token_file()));
        Self::new(config.api_url(), token, config.timeout())
    }

    pub fn deploy_url(&self) -> String {
        format!("{}/deploy", self.api_url)
    }
}

#[async_trait]
impl DeployClient for OperatorClient {
    fn cached_token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn deploy(
        &self,
        request: UploadRequest<'_>,
        progress: Arc<UploadProgress>,
    ) -> Result<ApiResponse, TransportError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| TransportError::Request("no token available".to_string()))?;

        let file = tokio::fs::File::open(request.archive_path)
            .await
            .map_err(TransportError::Bundle)?;
        let length = file
            .metadata()
            .await
            .map_err(TransportError::Bundle)?
            .len();

        let mut sent = 0u64;
        let tracker = progress.clone();
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                tracker.on_progress(sent);
            }
            chunk
        });

        let bundle = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(stream),
            length,
        )
        .file_name("bundle.tar.xz")
        .mime_str("application/x-xz")
        .map_err(|e| TransportError::Request(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("git_sha", request.revision_id.to_string())
            .text("project", project_name(request.target_dir))
            .part("bundle", bundle);

        debug!(url = %self.deploy_url(), bytes = length, "uploading bundle");
        let resp = self
            .http
            .post(self.deploy_url())
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify_reqwest_error)?;
        debug!(status, body_len = body.len(), "deploy response received");
        Ok(ApiResponse { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

/// Name the service shows for a project: the final path component.
pub fn project_name(target_dir: &Path) -> String {
    let resolved: PathBuf = target_dir
        .canonicalize()
        .unwrap_or_else(|_| target_dir.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
    error: Option<String>,
}

/// Turn an unexpected API response into a one-line description.
///
/// JSON bodies with a `detail`, `message` or `error` field are reduced to
/// that field; anything else is shown as a truncated excerpt. Any occurrence
/// of `secret` is masked.
pub fn describe_response(response: &ApiResponse, secret: Option<&str>) -> String {
    let detail = serde_json::from_str::<ErrorBody>(&response.body)
        .ok()
        .and_then(|b| {
            b.detail
                .map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .or(b.message)
                .or(b.error)
        })
        .unwrap_or_else(|| response.body.trim().to_string());

    let detail = match secret {
        Some(secret) if !secret.is_empty() => detail.replace(secret, "[REDACTED]"),
        _ => detail,
    };

    if detail.is_empty() {
        return format!("empty response body (status code {})", response.status);
    }
    if detail.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{}...", cut)
    } else {
        detail
    }
}
