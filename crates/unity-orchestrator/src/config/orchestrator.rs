use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use unity_types::{StageName, UnityError, UnityResult};

use super::logging::LoggingConfig;
use super::preflight::PreflightConfig;
use super::stage::{ProbeConfig, StageConfig};
use super::supervisor::SupervisorConfig;
use super::types::{parse_flag, LogLevel};
use super::watchdog::WatchdogConfig;
use crate::process::ProcessSpec;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    #[serde(default = "StageConfig::backend")]
    pub backend: StageConfig,
    #[serde(default = "StageConfig::local_inference")]
    pub local_inference: StageConfig,
    #[serde(default = "StageConfig::heartbeat")]
    pub heartbeat: StageConfig,
    pub supervisor: SupervisorConfig,
    pub watchdog: WatchdogConfig,
    pub preflight: PreflightConfig,
    pub logging: LoggingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/unity"));

        Self {
            data_dir: home.join(".unity"),
            backend: StageConfig::backend(),
            local_inference: StageConfig::local_inference(),
            heartbeat: StageConfig::heartbeat(),
            supervisor: SupervisorConfig::default(),
            watchdog: WatchdogConfig::default(),
            preflight: PreflightConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn load(path: impl AsRef<Path>) -> UnityResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| UnityError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| UnityError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> UnityResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| UnityError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| UnityError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| UnityError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("UNITY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("UNITY_BACKEND_URL") {
            let marker = match &self.backend.probe {
                ProbeConfig::Http { marker, .. } => marker.clone(),
                _ => None,
            };
            self.backend.probe = ProbeConfig::Http { url, marker };
        }

        if let Ok(url) = std::env::var("UNITY_USAGE_URL") {
            self.watchdog.usage_url = Some(url);
        }

        if let Ok(interval) = std::env::var("UNITY_WATCHDOG_INTERVAL") {
            match interval.parse() {
                Ok(secs) => self.watchdog.interval_secs = secs,
                Err(_) => warn!("Ignoring invalid UNITY_WATCHDOG_INTERVAL: {}", interval),
            }
        }

        if let Ok(level) = std::env::var("UNITY_LOG_LEVEL") {
            self.logging.level = level.parse().unwrap_or(LogLevel::Info);
        }

        if let Ok(json) = std::env::var("UNITY_LOG_JSON") {
            self.logging.json = parse_flag(&json).unwrap_or(true);
        }

        if let Ok(primary) = std::env::var("UNITY_LOCAL_PRIMARY") {
            if let Some(flag) = parse_flag(&primary) {
                self.supervisor.local_primary = flag;
            }
        }
    }

    pub fn validate(&self) -> UnityResult<()> {
        for stage in StageName::ALL {
            self.stage(stage).validate(stage)?;
        }

        if self.supervisor.poll_interval_ms < 10 {
            return Err(UnityError::Config(
                "Probe poll interval must be at least 10ms".into(),
            ));
        }

        if self.supervisor.monitor_interval_secs == 0 {
            return Err(UnityError::Config(
                "Monitor interval must be at least 1 second".into(),
            ));
        }

        if self.supervisor.restart_backoff_base_ms > self.supervisor.restart_backoff_max_ms {
            return Err(UnityError::Config(
                "Restart backoff base cannot exceed the backoff cap".into(),
            ));
        }

        if self.watchdog.consecutive_threshold == 0 {
            return Err(UnityError::Config(
                "Watchdog consecutive threshold must be at least 1".into(),
            ));
        }

        if self.watchdog.interval_secs == 0 || self.watchdog.observe_timeout_secs == 0 {
            return Err(UnityError::Config(
                "Watchdog interval and observe timeout must be at least 1 second".into(),
            ));
        }

        if self.watchdog.observe_timeout_secs > self.watchdog.interval_secs {
            warn!(
                "Watchdog observe timeout ({}s) exceeds its interval ({}s)",
                self.watchdog.observe_timeout_secs, self.watchdog.interval_secs
            );
        }

        if self.watchdog.enabled && self.watchdog.usage_url.is_none() {
            warn!("Watchdog enabled but no usage_url configured. Failover is inactive.");
        }

        Ok(())
    }

    pub fn stage(&self, stage: StageName) -> &StageConfig {
        match stage {
            StageName::Backend => &self.backend,
            StageName::LocalInference => &self.local_inference,
            StageName::Heartbeat => &self.heartbeat,
        }
    }

    pub fn stage_specs(&self) -> Vec<(StageName, ProcessSpec)> {
        StageName::ALL
            .iter()
            .map(|&stage| (stage, self.stage(stage).to_spec(stage)))
            .collect()
    }
}
