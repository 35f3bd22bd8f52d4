use super::commands::OutputFormat;
use unity_orchestrator::{diagnostics, DiagnosticsStatus, OrchestratorConfig, Severity};
use unity_types::{UnityError, UnityResult};

pub async fn run_checks(config: &OrchestratorConfig, format: &OutputFormat) -> UnityResult<()> {
    let result = diagnostics::preflight(config, config.supervisor.local_primary).await;

    if let OutputFormat::Json = format {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| UnityError::Internal(format!("Serialize error: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    println!("\x1b[38;5;46mUnity Preflight Checks\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!();

    let total = result.checks.len();
    for (i, check) in result.checks.iter().enumerate() {
        let label = format!("[{}/{}] {}:", i + 1, total, check.name);
        let verdict = match (check.passed, check.severity) {
            (true, _) => "\x1b[38;5;46mOK\x1b[0m",
            (false, Severity::Error) => "\x1b[38;5;196mFAIL\x1b[0m",
            (false, _) => "\x1b[38;5;226mWARN\x1b[0m",
        };
        println!("{:<26} {} - {}", label, verdict, check.message);
    }

    println!();
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!(
        "Results: \x1b[38;5;46m{} passed\x1b[0m, \x1b[38;5;226m{} warnings\x1b[0m, \x1b[38;5;196m{} failed\x1b[0m",
        result.passed(),
        result.warnings(),
        result.failures()
    );

    match result.status {
        DiagnosticsStatus::Error => {
            println!("\n\x1b[38;5;196mSome checks failed. Fix issues before running.\x1b[0m")
        }
        DiagnosticsStatus::Warning => {
            println!("\n\x1b[38;5;226mAll critical checks passed. Some warnings may need attention.\x1b[0m")
        }
        DiagnosticsStatus::Ok => println!("\n\x1b[38;5;46mAll checks passed! Ready to run.\x1b[0m"),
    }

    Ok(())
}
