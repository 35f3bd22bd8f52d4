use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaReading {
    Remaining(u64),
    Unreachable,
}

/// One observation of the remote dependency. Consumed as soon as it is evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogSignal {
    pub dependency_id: String,
    pub reading: QuotaReading,
    pub observed_at: DateTime<Utc>,
}

impl WatchdogSignal {
    pub fn new(dependency_id: impl Into<String>, reading: QuotaReading) -> Self {
        Self {
            dependency_id: dependency_id.into(),
            reading,
            observed_at: Utc::now(),
        }
    }

    pub fn unreachable(dependency_id: impl Into<String>) -> Self {
        Self::new(dependency_id, QuotaReading::Unreachable)
    }

    /// Unreachable or out of quota.
    pub fn is_bad(&self) -> bool {
        matches!(self.reading, QuotaReading::Unreachable | QuotaReading::Remaining(0))
    }
}
