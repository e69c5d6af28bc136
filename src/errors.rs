//! Typed error hierarchy for the deploy pipeline.
//!
//! Three enums cover the three layers:
//! - `ArchiveError` — bundling the project directory
//! - `TransportError` — connection-level upload faults (no HTTP response)
//! - `DeployError` — everything the orchestrator reports to the operator

use std::path::PathBuf;
use thiserror::Error;

/// Errors from building the `.tar.xz` bundle.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source tree could not be read, or a file vanished mid-walk.
    #[error("Failed to read {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The temporary archive could not be created or written.
    #[error("Failed to write bundle archive: {0}")]
    Write(#[source] std::io::Error),
}

/// Faults raised by the transport before any response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Failed to read bundle for upload: {0}")]
    Bundle(#[source] std::io::Error),

    #[error("Request failed: {0}")]
    Request(String),
}

/// Every way a deploy invocation can end other than success.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Cannot read project directory {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("Cannot write bundle archive: {0}")]
    ArchiveWrite(String),

    #[error("No token present in token.json")]
    MissingCredential,

    #[error("{0}")]
    ConnectionFailure(String),

    #[error("Invalid login, please double check your username, password, and/or token (status code {status})")]
    InvalidCredentials { status: u16 },

    #[error("Deploy rejected (status code {status}): {detail}")]
    OtherApiError { status: u16, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl DeployError {
    /// Process exit code for this failure. Every failure path exits non-zero.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Follow-up hint shown under the error line, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DeployError::MissingCredential => Some("Did you get a token with 'inferex login'?"),
            DeployError::ConnectionFailure(_) => {
                Some("Check your network connection and the configured API url")
            }
            _ => None,
        }
    }
}

impl From<ArchiveError> for DeployError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Filesystem { path, source } => DeployError::Filesystem {
                path,
                message: source.to_string(),
            },
            ArchiveError::Write(source) => DeployError::ArchiveWrite(source.to_string()),
        }
    }
}
