use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "inferex")]
#[command(version, about = "Bundle and deploy projects to Inferex")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Directory holding config.toml and token.json
    #[arg(long, global = true, env = "INFEREX_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bundle a project directory and deploy it
    Deploy {
        /// Project directory (defaults to --project-dir or the current directory)
        dir: Option<PathBuf>,

        /// Revision id to deploy under (defaults to a hash of the project contents)
        #[arg(long)]
        revision: Option<String>,

        /// Deployment API base url, overrides config and INFEREX_API_URL
        #[arg(long)]
        api_url: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Print the config directory path
    Path,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "inferex=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Deploy {
            dir,
            revision,
            api_url,
        } => {
            let code = cmd::cmd_deploy(&cli, dir.clone(), revision.clone(), api_url.clone()).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
