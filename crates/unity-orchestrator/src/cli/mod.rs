mod checks;
mod commands;
mod config_cmd;
mod run;
mod status;
mod utils;

pub use checks::run_checks;
pub use commands::{Cli, Commands};
pub use config_cmd::handle_config;
pub use run::run_orchestrator;
pub use status::show_status;
pub use utils::{init_logging, show_version};
