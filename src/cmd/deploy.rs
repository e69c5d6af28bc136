//! Bundle-and-upload command — `inferex deploy`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::super::Cli;

pub async fn cmd_deploy(
    cli: &Cli,
    dir: Option<PathBuf>,
    revision: Option<String>,
    api_url: Option<String>,
) -> Result<i32> {
    use inferex::client::OperatorClient;
    use inferex::config::InferexConfig;
    use inferex::deploy::{BundleRequest, DeployReporter, Deployer};
    use inferex::errors::DeployError;
    use inferex::revision::compute_revision;
    use inferex::ui::DeployUI;

    let target_dir = match dir.or_else(|| cli.project_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = InferexConfig::with_cli_args(super::config_dir(cli)?, api_url)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let ui = DeployUI::new(cli.verbose);

    let revision_id = match revision {
        Some(rev) => rev,
        None if target_dir.is_dir() => match compute_revision(&target_dir) {
            Ok(rev) => rev,
            Err(e) => {
                let err = DeployError::from(e);
                ui.error(&err.to_string());
                return Ok(err.exit_code());
            }
        },
        // The deployer reports the unreadable directory.
        None => "unknown".to_string(),
    };

    if !cli.yes && console::user_attended() && target_dir.is_dir() {
        use dialoguer::Confirm;
        let short: String = revision_id.chars().take(12).collect();
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Deploy {} at revision {}?",
                target_dir.display(),
                short
            ))
            .default(true)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Deploy cancelled");
            return Ok(0);
        }
    }

    let client = OperatorClient::from_config(&config)?;
    let deployer = Deployer::new(client, ui).with_temp_dir(config.temp_dir());
    let request = BundleRequest::new(target_dir, revision_id);

    match deployer.deploy(&request).await {
        Ok(report) => {
            tracing::info!(
                revision = %report.revision_id,
                bytes = report.bundle_bytes,
                files = report.entry_count,
                "deploy finished"
            );
            Ok(0)
        }
        Err(err) => Ok(err.exit_code()),
    }
}
