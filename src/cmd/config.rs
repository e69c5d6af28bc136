//! Configuration view and validation commands — `inferex config`.

use anyhow::Result;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    use inferex::config::{API_URL_ENV, InferexConfig, TOKEN_ENV};

    let config = InferexConfig::new(super::config_dir(cli)?)?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Inferex Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            println!("[api]");
            match &config.toml.api.url {
                Some(url) => println!("  url = \"{}\"", url),
                None => println!("  url = (default)"),
            }
            println!("  timeout_secs = {}", config.toml.api.timeout_secs);
            println!();
            println!("[bundle]");
            match &config.toml.bundle.temp_dir {
                Some(dir) => println!("  temp_dir = \"{}\"", dir.display()),
                None => println!("  temp_dir = (system temp dir)"),
            }
            println!();

            println!("Effective values (with env overrides):");
            println!("  api_url = \"{}\"", config.api_url());
            println!("  temp_dir = \"{}\"", config.temp_dir().display());
            let token_source = if std::env::var(TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
                format!("{} (env)", TOKEN_ENV)
            } else if inferex::client::read_token_file(&config.token_file()).is_some() {
                config.token_file().display().to_string()
            } else {
                "none".to_string()
            };
            println!("  token = {}", token_source);
            if config.env_api_url.is_some() {
                println!("  ({} is set)", API_URL_ENV);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Path) => {
            println!("{}", config.config_dir.display());
        }
    }

    Ok(())
}
