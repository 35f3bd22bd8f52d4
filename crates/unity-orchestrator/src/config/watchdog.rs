use serde::{Deserialize, Serialize};
use std::time::Duration;
use unity_types::{DEFAULT_FAILOVER_THRESHOLD, DEFAULT_WATCHDOG_INTERVAL_SECS, DEFAULT_WATCHDOG_OBSERVE_TIMEOUT_SECS};

use super::constants::DEFAULT_DEPENDENCY_ID;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub dependency_id: String,
    pub usage_url: Option<String>,
    pub interval_secs: u64,
    pub observe_timeout_secs: u64,
    pub consecutive_threshold: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dependency_id: DEFAULT_DEPENDENCY_ID.into(),
            usage_url: None,
            interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            observe_timeout_secs: DEFAULT_WATCHDOG_OBSERVE_TIMEOUT_SECS,
            consecutive_threshold: DEFAULT_FAILOVER_THRESHOLD,
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn observe_timeout(&self) -> Duration {
        Duration::from_secs(self.observe_timeout_secs)
    }

    /// Enabled and pointed at a usage endpoint.
    pub fn is_active(&self) -> bool {
        self.enabled && self.usage_url.is_some()
    }
}
