use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use unity_types::{StageName, UnityError, UnityResult, DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_STARTUP_TIMEOUT_SECS};

use super::constants::*;
use crate::process::{ProbeDescriptor, ProcessSpec};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    Http {
        url: String,
        #[serde(default)]
        marker: Option<String>,
    },
    Tcp {
        addr: String,
    },
    Liveness {
        settle_secs: u64,
    },
    #[default]
    None,
}

impl ProbeConfig {
    pub fn to_descriptor(&self) -> ProbeDescriptor {
        match self {
            ProbeConfig::Http { url, marker } => ProbeDescriptor::Http {
                url: url.clone(),
                marker: marker.clone(),
            },
            ProbeConfig::Tcp { addr } => ProbeDescriptor::Tcp { addr: addr.clone() },
            ProbeConfig::Liveness { settle_secs } => ProbeDescriptor::Liveness {
                settle: Duration::from_secs(*settle_secs),
            },
            ProbeConfig::None => ProbeDescriptor::None,
        }
    }

    pub fn http_url(&self) -> Option<&str> {
        match self {
            ProbeConfig::Http { url, .. } => Some(url),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub probe: ProbeConfig,
    pub startup_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            probe: ProbeConfig::None,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl StageConfig {
    pub fn backend() -> Self {
        Self {
            command: "python3".into(),
            args: vec![
                "-m".into(),
                "uvicorn".into(),
                "backend.api_server:app".into(),
                "--host".into(),
                "127.0.0.1".into(),
                "--port".into(),
                "8000".into(),
            ],
            probe: ProbeConfig::Http {
                url: DEFAULT_BACKEND_HEALTH_URL.into(),
                marker: None,
            },
            ..Default::default()
        }
    }

    pub fn local_inference() -> Self {
        Self {
            command: "ollama".into(),
            args: vec!["serve".into()],
            probe: ProbeConfig::Http {
                url: DEFAULT_LOCAL_HEALTH_URL.into(),
                marker: Some(DEFAULT_LOCAL_HEALTH_MARKER.into()),
            },
            startup_timeout_secs: 30,
            ..Default::default()
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            command: "python3".into(),
            args: vec!["services/kernel/heartbeat.py".into()],
            probe: ProbeConfig::Liveness {
                settle_secs: DEFAULT_HEARTBEAT_SETTLE_SECS,
            },
            ..Default::default()
        }
    }

    pub fn to_spec(&self, stage: StageName) -> ProcessSpec {
        let mut spec = ProcessSpec::new(stage.as_str(), self.command.clone())
            .with_args(self.args.iter().cloned())
            .with_probe(self.probe.to_descriptor())
            .with_startup_timeout(Duration::from_secs(self.startup_timeout_secs))
            .with_shutdown_grace(Duration::from_secs(self.shutdown_grace_secs));

        if let Some(ref dir) = self.working_dir {
            spec = spec.with_working_dir(dir.clone());
        }
        for (key, value) in &self.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        spec
    }

    pub fn validate(&self, stage: StageName) -> UnityResult<()> {
        if self.command.trim().is_empty() {
            return Err(UnityError::Config(format!("Stage '{}' has no command", stage)));
        }

        if self.startup_timeout_secs == 0 {
            return Err(UnityError::Config(format!(
                "Stage '{}' startup timeout must be at least 1 second",
                stage
            )));
        }

        match &self.probe {
            ProbeConfig::Http { url, .. } => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(UnityError::Config(format!(
                        "Stage '{}' probe URL must be http(s): {}",
                        stage, url
                    )));
                }
            }
            ProbeConfig::Tcp { addr } => {
                if !addr.contains(':') {
                    return Err(UnityError::Config(format!(
                        "Stage '{}' probe address must be host:port: {}",
                        stage, addr
                    )));
                }
            }
            ProbeConfig::Liveness { settle_secs } => {
                if *settle_secs >= self.startup_timeout_secs {
                    return Err(UnityError::Config(format!(
                        "Stage '{}' settle time must be shorter than its startup timeout",
                        stage
                    )));
                }
            }
            ProbeConfig::None => {}
        }

        Ok(())
    }
}
