//! The deploy pipeline: bundle, authenticate, upload, report.
//!
//! A single [`Deployer::deploy`] call walks the states
//! `Idle → Preparing → Compressed → Authenticating → Uploading` and ends in
//! `Succeeded` or `Failed`. The bundle lives in an [`ArchiveFile`] owned by
//! that call, so it is removed on every exit path. Nothing is retried.

use crate::archive::{self, ArchiveFile};
use crate::client::{ApiResponse, DeployClient, UploadRequest, describe_response};
use crate::errors::{DeployError, TransportError};
use crate::progress::{PROGRESS_BAR_STEPS, ProgressSink, UploadProgress};
use crate::util::format_size;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// What to deploy: a project directory at a given revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub target_dir: PathBuf,
    pub revision_id: String,
}

impl BundleRequest {
    pub fn new(target_dir: impl Into<PathBuf>, revision_id: impl Into<String>) -> Self {
        Self {
            target_dir: target_dir.into(),
            revision_id: revision_id.into(),
        }
    }
}

/// Pipeline stage, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Idle,
    Preparing,
    Compressed,
    Authenticating,
    Uploading,
    Succeeded,
    Failed,
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeployState::Idle => "idle",
            DeployState::Preparing => "preparing",
            DeployState::Compressed => "compressed",
            DeployState::Authenticating => "authenticating",
            DeployState::Uploading => "uploading",
            DeployState::Succeeded => "succeeded",
            DeployState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classification of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Success,
    InvalidCredentials { status: u16 },
    ConnectionFailure(String),
    OtherApiError(ApiResponse),
}

impl DeployOutcome {
    /// Map what the transport returned onto an outcome.
    ///
    /// Only connection-level faults count as `ConnectionFailure`; any other
    /// transport error has no response to show and is reported the same way.
    pub fn classify(result: Result<ApiResponse, TransportError>) -> Self {
        match result {
            Ok(resp) if resp.is_ok() => DeployOutcome::Success,
            Ok(resp) if resp.is_forbidden() => DeployOutcome::InvalidCredentials {
                status: resp.status,
            },
            Ok(resp) => DeployOutcome::OtherApiError(resp),
            Err(err) => DeployOutcome::ConnectionFailure(err.to_string()),
        }
    }

    /// Convert into the operator-facing result. `secret` is masked in any
    /// response text that is passed through.
    pub fn into_result(self, secret: Option<&str>) -> Result<(), DeployError> {
        match self {
            DeployOutcome::Success => Ok(()),
            DeployOutcome::InvalidCredentials { status } => {
                Err(DeployError::InvalidCredentials { status })
            }
            DeployOutcome::ConnectionFailure(msg) => Err(DeployError::ConnectionFailure(msg)),
            DeployOutcome::OtherApiError(resp) => Err(DeployError::OtherApiError {
                status: resp.status,
                detail: describe_response(&resp, secret),
            }),
        }
    }
}

/// Presentation seam for the deploy flow.
pub trait DeployReporter: Send + Sync {
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn error(&self, msg: &str);
    /// Extra detail, shown only in verbose mode.
    fn detail(&self, msg: &str);
    fn start_compression(&self);
    fn finish_compression(&self);
    /// Display for the upload, with `steps` positions.
    fn upload_sink(&self, steps: u64) -> Arc<dyn ProgressSink>;
}

/// Summary of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub revision_id: String,
    pub bundle_bytes: u64,
    pub entry_count: usize,
}

/// Runs deploys against a client, reporting through a reporter.
pub struct Deployer<C, R> {
    client: C,
    reporter: R,
    temp_dir: Option<PathBuf>,
    state: Mutex<DeployState>,
}

impl<C: DeployClient, R: DeployReporter> Deployer<C, R> {
    pub fn new(client: C, reporter: R) -> Self {
        Self {
            client,
            reporter,
            temp_dir: None,
            state: Mutex::new(DeployState::Idle),
        }
    }

    /// Write bundles into `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Stage reached by the most recent deploy; `Idle` before the first.
    pub fn state(&self) -> DeployState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, state: DeployState) {
        debug!(%state, "deploy state");
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Run one deploy and report its outcome.
    ///
    /// Every failure is reported once through the reporter before it is
    /// returned; the caller only needs to pick the exit code.
    pub async fn deploy(&self, request: &BundleRequest) -> Result<DeployReport, DeployError> {
        self.enter(DeployState::Idle);
        let result = self.run(request).await;
        match &result {
            Ok(_) => self.enter(DeployState::Succeeded),
            Err(err) => {
                self.enter(DeployState::Failed);
                debug!(error = %err, "deploy failed");
                self.reporter.error(&err.to_string());
                if let Some(hint) = err.hint() {
                    self.reporter.info(hint);
                }
            }
        }
        result
    }

    async fn run(&self, request: &BundleRequest) -> Result<DeployReport, DeployError> {
        self.enter(DeployState::Preparing);
        validate(request)?;
        self.reporter.info(&format!(
            "Preparing to deploy: {}\n",
            request.target_dir.display()
        ));

        let archive = self.compress(&request.target_dir).await?;
        let bundle_bytes = archive.size()?;
        self.enter(DeployState::Compressed);
        self.reporter
            .success(&format!("Bundle prepared: {}", format_size(bundle_bytes)));
        self.reporter.detail(&format!(
            "{} files, revision {}",
            archive.entry_count(),
            request.revision_id
        ));

        self.enter(DeployState::Authenticating);
        let token = self
            .client
            .cached_token()
            .ok_or(DeployError::MissingCredential)?;

        self.enter(DeployState::Uploading);
        let progress = Arc::new(UploadProgress::new(
            bundle_bytes,
            PROGRESS_BAR_STEPS,
            self.reporter.upload_sink(PROGRESS_BAR_STEPS),
        )?);
        let upload = UploadRequest {
            revision_id: &request.revision_id,
            archive_path: archive.path(),
            target_dir: &request.target_dir,
        };
        let result = self.client.deploy(upload, progress.clone()).await;
        progress.finish();

        if let Ok(resp) = &result {
            debug!(status = resp.status, "deploy call returned");
        }
        DeployOutcome::classify(result).into_result(Some(&token))?;

        self.reporter.success("Deploy complete");
        Ok(DeployReport {
            revision_id: request.revision_id.clone(),
            bundle_bytes,
            entry_count: archive.entry_count(),
        })
        // `archive` drops here, or at any `?` above, deleting the bundle.
    }

    async fn compress(&self, target_dir: &Path) -> Result<ArchiveFile, DeployError> {
        let source = target_dir.to_path_buf();
        let temp_dir = self.temp_dir.clone();

        self.reporter.start_compression();
        let joined = tokio::task::spawn_blocking(move || match temp_dir {
            Some(dir) => archive::create_archive_in(&source, &dir),
            None => archive::create_archive(&source),
        })
        .await;
        self.reporter.finish_compression();

        let archive = joined
            .map_err(|e| DeployError::ArchiveWrite(format!("compression task failed: {}", e)))??;
        info!(
            archive = %archive.path().display(),
            entries = archive.entry_count(),
            "bundle ready"
        );
        Ok(archive)
    }
}

fn validate(request: &BundleRequest) -> Result<(), DeployError> {
    if request.revision_id.trim().is_empty() {
        return Err(DeployError::InvalidArgument(
            "revision id must not be empty".to_string(),
        ));
    }
    match std::fs::metadata(&request.target_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(DeployError::Filesystem {
            path: request.target_dir.clone(),
            message: "not a directory".to_string(),
        }),
        Err(e) => Err(DeployError::Filesystem {
            path: request.target_dir.clone(),
            message: e.to_string(),
        }),
    }
}
