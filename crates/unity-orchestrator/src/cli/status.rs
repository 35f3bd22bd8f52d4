use super::commands::OutputFormat;
use unity_orchestrator::OrchestratorConfig;
use unity_types::{StageName, UnityError, UnityResult};

pub fn show_status(config: &OrchestratorConfig, format: &OutputFormat) -> UnityResult<()> {
    let local_primary = config.supervisor.local_primary;
    let plan: Vec<_> = config
        .stage_specs()
        .into_iter()
        .map(|(stage, spec)| {
            let started = stage.always_mandatory() || local_primary;
            (stage, spec, started)
        })
        .collect();

    if let OutputFormat::Json = format {
        let stages: Vec<_> = plan
            .iter()
            .map(|(stage, spec, started)| {
                serde_json::json!({
                    "stage": stage.as_str(),
                    "command": spec.command_line(),
                    "probe": spec.probe().to_string(),
                    "startup_timeout_secs": spec.startup_timeout().as_secs(),
                    "shutdown_grace_secs": spec.shutdown_grace().as_secs(),
                    "started_at_boot": started,
                })
            })
            .collect();
        let json = serde_json::json!({
            "data_dir": config.data_dir,
            "local_primary": local_primary,
            "watchdog_active": config.watchdog.is_active(),
            "stages": stages,
        });
        let out = serde_json::to_string_pretty(&json)
            .map_err(|e| UnityError::Internal(format!("Serialize error: {}", e)))?;
        println!("{}", out);
        return Ok(());
    }

    println!("\x1b[38;5;46mStage Plan\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    for (i, (stage, spec, started)) in plan.iter().enumerate() {
        let marker = if *started {
            "\x1b[38;5;46m[+]\x1b[0m"
        } else {
            "\x1b[38;5;245m[ ]\x1b[0m"
        };
        println!("{} {}. \x1b[38;5;51m{}\x1b[0m", marker, i + 1, stage);
        println!("      command:  {}", spec.command_line());
        println!("      probe:    {}", spec.probe());
        println!(
            "      timeouts: startup {}s, grace {}s",
            spec.startup_timeout().as_secs(),
            spec.shutdown_grace().as_secs()
        );
        if *stage == StageName::LocalInference && !started {
            println!("      \x1b[38;5;245mstarted on failover only\x1b[0m");
        }
    }
    println!();

    let watchdog = &config.watchdog;
    match watchdog.usage_url.as_deref() {
        Some(url) if watchdog.is_active() => println!(
            "Failover watchdog: \x1b[38;5;46mactive\x1b[0m ({} every {}s, {} bad samples)",
            url, watchdog.interval_secs, watchdog.consecutive_threshold
        ),
        _ => println!("Failover watchdog: \x1b[38;5;245minactive\x1b[0m"),
    }

    Ok(())
}
