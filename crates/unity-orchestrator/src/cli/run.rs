use super::utils::print_banner;
use tracing::{error, info, warn};
use unity_orchestrator::{DiagnosticsStatus, Orchestrator, OrchestratorConfig, Severity};
use unity_types::{SupervisorSnapshot, UnityError, UnityResult};

pub async fn run_orchestrator(config: OrchestratorConfig) -> UnityResult<()> {
    print_banner();
    info!("Starting Unity orchestrator v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| UnityError::Config(format!("Failed to create data directory: {}", e)))?;

    let orchestrator = Orchestrator::new(config)?;

    let preflight = orchestrator.preflight().await;
    for check in preflight.checks.iter().filter(|c| !c.passed) {
        match check.severity {
            Severity::Error => error!("Preflight {}: {}", check.name, check.message),
            _ => warn!("Preflight {}: {}", check.name, check.message),
        }
    }
    if preflight.status == DiagnosticsStatus::Error {
        warn!("Preflight reported errors, starting anyway");
    }

    match orchestrator.start().await {
        Ok(()) => print_ready_message(&orchestrator.status()),
        Err(e) if exits_daemon(&e) => {
            error!("Startup failed: {}", e);
            orchestrator.shutdown().await;
            return Err(e);
        }
        Err(e) => {
            error!("Startup incomplete: {}", e);
            for stage in orchestrator.status().failed_stages() {
                warn!("Stage '{}' failed; use a restart to recover it", stage);
            }
            print_ready_message(&orchestrator.status());
        }
    }

    wait_for_shutdown().await;

    info!("Shutting down...");
    orchestrator.shutdown().await;

    let stopped = orchestrator.status();
    let forced: Vec<_> = stopped
        .details
        .iter()
        .filter(|d| d.forced_kill)
        .map(|d| d.stage.as_str())
        .collect();
    if !forced.is_empty() {
        warn!("Forced kill needed for: {}", forced.join(", "));
    }

    info!("Shutdown complete");
    Ok(())
}

/// Only a fatal startup error stops the daemon; stage failures stay visible in the snapshot.
fn exits_daemon(err: &UnityError) -> bool {
    err.is_fatal()
}

fn print_ready_message(snapshot: &SupervisorSnapshot) {
    println!();
    println!("\x1b[38;5;46m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    let headline = if snapshot.ready {
        "Unity orchestrator is now running!"
    } else {
        "Unity orchestrator running, some stages failed"
    };
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[1;38;5;46m{:<60}\x1b[0m\x1b[38;5;46m║\x1b[0m", headline);
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    for detail in &snapshot.details {
        let pid = detail.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "\x1b[38;5;46m║\x1b[0m    \x1b[38;5;51m{:<16}\x1b[0m {:<24} pid {:<10}  \x1b[38;5;46m║\x1b[0m",
            detail.stage.as_str(),
            detail.state.to_string(),
            pid
        );
    }
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    let primary = if snapshot.local_primary { "local inference" } else { "remote" };
    println!("\x1b[38;5;46m║\x1b[0m  Primary inference: \x1b[38;5;226m{:<40}\x1b[0m \x1b[38;5;46m║\x1b[0m", primary);
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mPress Ctrl+C to stop\x1b[0m                                        \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╚══════════════════════════════════════════════════════════════╝\x1b[0m");
    println!();
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
            _ = sigint.recv() => { info!("Received SIGINT"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C");
    }
}
