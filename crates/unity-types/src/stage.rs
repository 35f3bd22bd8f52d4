use crate::UnityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One managed process in the supervised startup sequence.
///
/// Variants are declared in start order; `Ord` follows that order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Backend,
    LocalInference,
    Heartbeat,
}

impl StageName {
    pub const ALL: [StageName; 3] = [
        StageName::Backend,
        StageName::LocalInference,
        StageName::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Backend => "backend",
            StageName::LocalInference => "local-inference",
            StageName::Heartbeat => "heartbeat",
        }
    }

    /// Mandatory regardless of failover designation.
    pub fn always_mandatory(&self) -> bool {
        !matches!(self, StageName::LocalInference)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = UnityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "backend" => Ok(StageName::Backend),
            "local-inference" | "local_inference" | "local" | "inference" => {
                Ok(StageName::LocalInference)
            }
            "heartbeat" => Ok(StageName::Heartbeat),
            _ => Err(UnityError::UnknownStage(s.to_string())),
        }
    }
}

/// Why a stage never reached `Ready`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StartupFailure {
    Spawn(String),
    Timeout(Duration),
    Probe(String),
    Exited(Option<i32>),
    Cancelled,
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupFailure::Spawn(reason) => write!(f, "spawn failed: {}", reason),
            StartupFailure::Timeout(after) => write!(f, "readiness timed out after {:?}", after),
            StartupFailure::Probe(reason) => write!(f, "health probe rejected: {}", reason),
            StartupFailure::Exited(Some(code)) => write!(f, "exited during startup with code {}", code),
            StartupFailure::Exited(None) => write!(f, "exited during startup"),
            StartupFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}
