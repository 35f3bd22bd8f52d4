mod constants;
mod logging;
mod orchestrator;
mod preflight;
mod stage;
mod supervisor;
mod types;
mod watchdog;

pub use constants::*;
pub use logging::LoggingConfig;
pub use orchestrator::OrchestratorConfig;
pub use preflight::PreflightConfig;
pub use stage::{ProbeConfig, StageConfig};
pub use supervisor::SupervisorConfig;
pub use types::*;
pub use watchdog::WatchdogConfig;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProbeDescriptor;
    use std::time::Duration;
    use unity_types::StageName;

    #[test]
    fn test_default_config_validation() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_backend_probe() {
        let config = OrchestratorConfig::default();
        let spec = config.backend.to_spec(StageName::Backend);
        assert_eq!(spec.name(), "backend");
        assert_eq!(spec.startup_timeout(), Duration::from_secs(15));
        assert_eq!(spec.probe(), &ProbeDescriptor::http(DEFAULT_BACKEND_HEALTH_URL));
    }

    #[test]
    fn test_default_local_probe_uses_marker() {
        let config = OrchestratorConfig::default();
        let spec = config.local_inference.to_spec(StageName::LocalInference);
        assert_eq!(spec.command_line(), "ollama serve");
        match spec.probe() {
            ProbeDescriptor::Http { url, marker } => {
                assert_eq!(url, DEFAULT_LOCAL_HEALTH_URL);
                assert_eq!(marker.as_deref(), Some("models"));
            }
            other => panic!("unexpected probe {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_uses_liveness() {
        let config = OrchestratorConfig::default();
        assert!(matches!(
            config.heartbeat.to_spec(StageName::Heartbeat).probe(),
            ProbeDescriptor::Liveness { .. }
        ));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = OrchestratorConfig::default();
        config.heartbeat.command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_probe_url() {
        let mut config = OrchestratorConfig::default();
        config.backend.probe = ProbeConfig::Http { url: "localhost:8000".into(), marker: None };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_failover_threshold() {
        let mut config = OrchestratorConfig::default();
        config.watchdog.consecutive_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = OrchestratorConfig::default();
        config.supervisor.restart_backoff_base_ms = 20_000;
        config.supervisor.restart_backoff_max_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_stage_defaults() {
        let parsed: OrchestratorConfig = toml::from_str(
            r#"
            [watchdog]
            usage_url = "http://127.0.0.1:8000/usage"

            [backend]
            command = "uvicorn"
            "#,
        )
        .expect("Failed to parse");

        assert_eq!(parsed.local_inference.command, "ollama");
        assert_eq!(parsed.heartbeat.command, "python3");
        assert_eq!(parsed.backend.command, "uvicorn");
        assert!(parsed.watchdog.is_active());
        assert_eq!(parsed.watchdog.consecutive_threshold, 2);
    }

    #[test]
    fn test_probe_config_tagging() {
        let parsed: StageConfig = toml::from_str(
            r#"
            command = "redis-server"
            [probe]
            kind = "tcp"
            addr = "127.0.0.1:6379"
            "#,
        )
        .expect("Failed to parse");
        assert_eq!(parsed.probe, ProbeConfig::Tcp { addr: "127.0.0.1:6379".into() });
    }

    #[test]
    fn test_config_serialization() {
        let config = OrchestratorConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("Failed to serialize");
        let parsed: OrchestratorConfig = toml::from_str(&toml_str).expect("Failed to parse");
        assert_eq!(parsed.backend, config.backend);
        assert_eq!(parsed.supervisor, config.supervisor);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("unity-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = OrchestratorConfig::default();
        config.supervisor.max_restart_attempts = 7;
        config.save(&path).expect("save");

        let loaded = OrchestratorConfig::load(&path).expect("load");
        assert_eq!(loaded.supervisor.max_restart_attempts, 7);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
    }
}
