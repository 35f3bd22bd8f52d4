mod cli;

use clap::Parser;
use cli::{handle_config, init_logging, run_checks, run_orchestrator, show_status, show_version, Cli, Commands};
use std::path::PathBuf;
use unity_orchestrator::{LoggingConfig, OrchestratorConfig};
use unity_types::UnityResult;

#[tokio::main]
async fn main() -> UnityResult<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".unity"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/unity"))
    });

    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    let loaded = OrchestratorConfig::load(&config_path).map(|mut config| {
        if cli.data_dir.is_some() {
            config.data_dir = data_dir.clone();
        }
        config
    });
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    init_logging(&cli, &logging)?;

    match cli.command {
        Commands::Run => {
            run_orchestrator(loaded?).await?;
        }
        Commands::Check => {
            run_checks(&loaded?, &cli.format).await?;
        }
        Commands::Status => {
            show_status(&loaded?, &cli.format)?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, action)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}
