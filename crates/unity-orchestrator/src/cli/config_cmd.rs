use super::commands::ConfigAction;
use std::path::Path;
use unity_orchestrator::OrchestratorConfig;
use unity_types::{UnityError, UnityResult};

pub fn handle_config(config_path: &Path, action: Option<ConfigAction>) -> UnityResult<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .map_err(|e| UnityError::Config(format!("Failed to read config: {}", e)))?;
                println!("{}", content);
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
                println!("Run '\x1b[38;5;51munityd config init\x1b[0m' to create one");
            }
        }
        Some(ConfigAction::Init { force }) => {
            if config_path.exists() && !force {
                println!("\x1b[38;5;226m[!]\x1b[0m Configuration already exists at {:?} (use --force)", config_path);
                return Ok(());
            }
            OrchestratorConfig::default().save(config_path)?;
            println!("\x1b[38;5;46m[+]\x1b[0m Default configuration written to {:?}", config_path);
        }
        Some(ConfigAction::Validate) => {
            if config_path.exists() {
                match OrchestratorConfig::load(config_path) {
                    Ok(_) => println!("\x1b[38;5;46m[+]\x1b[0m Configuration is valid"),
                    Err(e) => println!("\x1b[38;5;196m[-]\x1b[0m Configuration error: {}", e),
                }
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
            }
        }
    }
    Ok(())
}
