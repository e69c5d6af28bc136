//! Client configuration for inferex.
//!
//! Settings live in `config.toml` inside the inferex config directory
//! (`~/.config/inferex` on Linux, overridable with `INFEREX_CONFIG_DIR`).
//! The same directory holds the cached `token.json`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! url = "https://api.inferex.com"
//! timeout_secs = 600
//!
//! [bundle]
//! temp_dir = "/var/tmp"
//! ```
//!
//! Values are layered file → environment → CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "INFEREX_CONFIG_DIR";
/// Overrides `[api] url`.
pub const API_URL_ENV: &str = "INFEREX_API_URL";
/// Overrides the token stored in `token.json`.
pub const TOKEN_ENV: &str = "INFEREX_TOKEN";

pub const CONFIG_FILE: &str = "config.toml";
pub const TOKEN_FILE: &str = "token.json";

pub const DEFAULT_API_URL: &str = "https://api.inferex.com";

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    /// Base url of the deployment service
    #[serde(default)]
    pub url: Option<String>,
    /// Whole-request timeout for uploads, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Bundle creation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleSection {
    /// Directory for temporary bundle files (defaults to the system temp dir)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

/// The complete config.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferexToml {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub bundle: BundleSection,
}

impl InferexToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load `config.toml` from `config_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(url) = &self.api.url
            && !is_http_url(url)
        {
            warnings.push(format!(
                "api.url '{}' should start with http:// or https://",
                url
            ));
        }
        if self.api.timeout_secs == 0 {
            warnings.push("api.timeout_secs is 0; uploads would time out immediately".to_string());
        }
        if let Some(dir) = &self.bundle.temp_dir
            && !dir.is_dir()
        {
            warnings.push(format!(
                "bundle.temp_dir '{}' is not an existing directory",
                dir.display()
            ));
        }
        warnings
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolve the inferex config directory (env override, then the platform dir).
pub fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("inferex"))
        .context("Could not determine the user config directory")
}

/// Effective configuration: config.toml merged with environment and CLI values.
#[derive(Debug, Clone)]
pub struct InferexConfig {
    /// Directory holding config.toml and token.json
    pub config_dir: PathBuf,
    /// Parsed config.toml
    pub toml: InferexToml,
    /// `INFEREX_API_URL`, captured at construction
    pub env_api_url: Option<String>,
    /// `--api-url` from the command line
    pub cli_api_url: Option<String>,
}

impl InferexConfig {
    /// Load configuration from `config_dir`, capturing environment overrides.
    pub fn new(config_dir: PathBuf) -> Result<Self> {
        let toml = InferexToml::load_or_default(&config_dir)?;
        Ok(Self {
            config_dir,
            toml,
            env_api_url: std::env::var(API_URL_ENV).ok().filter(|v| !v.is_empty()),
            cli_api_url: None,
        })
    }

    /// Load configuration with CLI overrides applied.
    pub fn with_cli_args(config_dir: PathBuf, api_url: Option<String>) -> Result<Self> {
        let mut config = Self::new(config_dir)?;
        config.cli_api_url = api_url;
        Ok(config)
    }

    /// Base url of the deployment service (CLI → env → file → default).
    pub fn api_url(&self) -> String {
        self.cli_api_url
            .clone()
            .or_else(|| self.env_api_url.clone())
            .or_else(|| self.toml.api.url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.toml.api.timeout_secs)
    }

    /// Directory for bundle temp files.
    pub fn temp_dir(&self) -> PathBuf {
        self.toml
            .bundle
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn token_file(&self) -> PathBuf {
        self.config_dir.join(TOKEN_FILE)
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Some(url) = self.cli_api_url.as_ref().or(self.env_api_url.as_ref())
            && !is_http_url(url)
        {
            warnings.push(format!("API url override '{}' is not an http(s) url", url));
        }
        warnings
    }
}
