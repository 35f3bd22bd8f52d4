use crate::{ExitOutcome, ProcessState, StageName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorStatus {
    #[default]
    Initializing,
    Running,
    PartiallyDegraded,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SupervisorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorStatus::Initializing => write!(f, "initializing"),
            SupervisorStatus::Running => write!(f, "running"),
            SupervisorStatus::PartiallyDegraded => write!(f, "partially degraded"),
            SupervisorStatus::ShuttingDown => write!(f, "shutting down"),
            SupervisorStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageDetail {
    pub stage: StageName,
    pub state: ProcessState,
    pub mandatory: bool,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub forced_kill: bool,
    pub last_error: Option<String>,
    pub last_exit: Option<ExitOutcome>,
    pub state_since: DateTime<Utc>,
}

/// Point-in-time copy of supervisor state. Never updated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSnapshot {
    pub overall: SupervisorStatus,
    pub stages: BTreeMap<StageName, ProcessState>,
    pub details: Vec<StageDetail>,
    pub local_primary: bool,
    pub ready: bool,
    pub last_transition: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

impl SupervisorSnapshot {
    pub fn state_of(&self, stage: StageName) -> Option<&ProcessState> {
        self.stages.get(&stage)
    }

    pub fn detail(&self, stage: StageName) -> Option<&StageDetail> {
        self.details.iter().find(|d| d.stage == stage)
    }

    pub fn failed_stages(&self) -> Vec<StageName> {
        self.details
            .iter()
            .filter(|d| matches!(d.state, ProcessState::Failed { .. }))
            .map(|d| d.stage)
            .collect()
    }
}
