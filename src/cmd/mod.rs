//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `deploy` | `Deploy`         |
//! | `config` | `Config`         |

pub mod config;
pub mod deploy;

pub use config::cmd_config;
pub use deploy::cmd_deploy;

use anyhow::Result;
use std::path::PathBuf;

/// Config directory from `--config-dir` / `INFEREX_CONFIG_DIR`, else the platform default.
fn config_dir(cli: &super::Cli) -> Result<PathBuf> {
    match &cli.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => inferex::config::default_config_dir(),
    }
}
