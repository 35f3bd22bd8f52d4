use serde::{Deserialize, Serialize};

use super::constants::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub min_available_ram_gb: f64,
    pub min_free_disk_gb: f64,
    pub http_timeout_secs: u64,
    /// Models the local runtime must list before it can take over.
    pub required_models: Vec<String>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            min_available_ram_gb: DEFAULT_MIN_AVAILABLE_RAM_GB,
            min_free_disk_gb: DEFAULT_MIN_FREE_DISK_GB,
            http_timeout_secs: DEFAULT_PREFLIGHT_HTTP_TIMEOUT_SECS,
            required_models: DEFAULT_REQUIRED_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }
}
