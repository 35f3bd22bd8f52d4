use serde::{Deserialize, Serialize};
use std::time::Duration;
use unity_types::DEFAULT_MAX_RESTART_ATTEMPTS;

use super::constants::*;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub poll_interval_ms: u64,
    pub monitor_interval_secs: u64,
    pub probe_attempt_timeout_ms: u64,
    pub max_restart_attempts: u32,
    pub restart_backoff_base_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub local_primary: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            probe_attempt_timeout_ms: DEFAULT_PROBE_ATTEMPT_TIMEOUT_MS,
            max_restart_attempts: DEFAULT_MAX_RESTART_ATTEMPTS,
            restart_backoff_base_ms: DEFAULT_RESTART_BACKOFF_BASE_MS,
            restart_backoff_max_ms: DEFAULT_RESTART_BACKOFF_MAX_MS,
            local_primary: false,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn probe_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_attempt_timeout_ms)
    }

    pub fn restart_backoff_base(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_base_ms)
    }

    pub fn restart_backoff_max(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_max_ms)
    }
}
