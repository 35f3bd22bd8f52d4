use super::commands::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};
use unity_orchestrator::LoggingConfig;
use unity_types::{UnityError, UnityResult};

pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn init_logging(cli: &Cli, logging: &LoggingConfig) -> UnityResult<()> {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => logging.level.as_filter(),
            1 => "info,unity_orchestrator=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let location = logging.source_location;

    let layer = match cli.log_file.as_ref().or(logging.file.as_ref()) {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .map_err(|e| UnityError::Config(format!("Failed to open log file: {}", e)))?;
            let writer = std::sync::Mutex::new(file);
            if logging.json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_file(location)
                    .with_line_number(location)
                    .boxed()
            }
        }
        None if logging.json => fmt::layer().json().boxed(),
        None => fmt::layer()
            .with_target(cli.verbose >= 2)
            .with_file(location)
            .with_line_number(location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| UnityError::Internal(format!("Failed to install logger: {}", e)))
}

pub fn print_banner() {
    println!("\x1b[38;5;39m");
    println!(r#"
    ██╗   ██╗███╗   ██╗██╗████████╗██╗   ██╗
    ██║   ██║████╗  ██║██║╚══██╔══╝╚██╗ ██╔╝
    ██║   ██║██╔██╗ ██║██║   ██║    ╚████╔╝
    ██║   ██║██║╚██╗██║██║   ██║     ╚██╔╝
    ╚██████╔╝██║ ╚████║██║   ██║      ██║
     ╚═════╝ ╚═╝  ╚═══╝╚═╝   ╚═╝      ╚═╝"#);
    println!("\x1b[0m");
    println!("        \x1b[38;5;245mSidecar Orchestrator - v{}\x1b[0m", BUILD_VERSION);
    println!();
}

pub fn show_version() {
    print_banner();
    println!("\x1b[38;5;46mBuild Information\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  Version:   \x1b[38;5;51m{}\x1b[0m", BUILD_VERSION);
    println!("  Profile:   \x1b[38;5;245m{}\x1b[0m", if cfg!(debug_assertions) { "debug" } else { "release" });
    println!();
    println!("\x1b[38;5;46mStages\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!("  1. \x1b[38;5;51mbackend\x1b[0m          (HTTP health gate)");
    println!("  2. \x1b[38;5;51mlocal-inference\x1b[0m  (when designated primary)");
    println!("  3. \x1b[38;5;51mheartbeat\x1b[0m        (liveness gate)");
    println!();
}
