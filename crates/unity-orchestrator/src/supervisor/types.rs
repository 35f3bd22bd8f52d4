use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use unity_types::{
    ExitOutcome, ProcessState, StageDetail, StageName, SupervisorSnapshot, SupervisorStatus,
};

use crate::process::Sidecar;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Initializing,
    Started,
    ShuttingDown,
    Stopped,
}

/// Which inference runtime is primary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Designation {
    #[default]
    Remote,
    Promoting,
    Local,
}

pub struct StageRecord {
    pub stage: StageName,
    pub state: ProcessState,
    pub generation: u64,
    pub sidecar: Option<Arc<dyn Sidecar>>,
    pub monitor: Option<JoinHandle<()>>,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub launches: u32,
    pub forced_kill: bool,
    pub last_error: Option<String>,
    pub last_exit: Option<ExitOutcome>,
    pub state_since: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(stage: StageName) -> Self {
        Self {
            stage,
            state: ProcessState::NotStarted,
            generation: 0,
            sidecar: None,
            monitor: None,
            pid: None,
            restarts: 0,
            launches: 0,
            forced_kill: false,
            last_error: None,
            last_exit: None,
            state_since: Utc::now(),
        }
    }

    /// Applies `next` if the state machine allows it. Returns whether it was applied.
    pub fn transition(&mut self, next: ProcessState) -> bool {
        if !self.state.can_transition_to(&next) {
            debug!(
                "Ignoring transition of '{}' from {} to {}",
                self.stage, self.state, next
            );
            return false;
        }
        debug!("Stage '{}': {} -> {}", self.stage, self.state, next);
        self.state = next;
        self.state_since = Utc::now();
        true
    }

    /// Starts a fresh process instance. Terminal states are left behind here.
    pub fn begin_instance(&mut self) -> u64 {
        self.generation += 1;
        self.launches += 1;
        self.state = ProcessState::Starting;
        self.state_since = Utc::now();
        self.sidecar = None;
        self.pid = None;
        self.forced_kill = false;
        self.generation
    }

    pub fn fail(&mut self, exit_code: Option<i32>, reason: impl Into<String>) {
        let reason = reason.into();
        if self.transition(ProcessState::failed(exit_code, reason.clone())) {
            warn!("Stage '{}' failed: {}", self.stage, reason);
            self.last_error = Some(reason);
        }
    }

    pub fn take_monitor(&mut self) -> Option<JoinHandle<()>> {
        self.monitor.take()
    }

    pub fn detail(&self, mandatory: bool) -> StageDetail {
        StageDetail {
            stage: self.stage,
            state: self.state.clone(),
            mandatory,
            pid: self.pid,
            restarts: self.restarts,
            forced_kill: self.forced_kill,
            last_error: self.last_error.clone(),
            last_exit: self.last_exit.clone(),
            state_since: self.state_since,
        }
    }
}

pub struct SupervisorState {
    pub records: BTreeMap<StageName, StageRecord>,
    pub phase: Phase,
    pub designation: Designation,
    phase_since: DateTime<Utc>,
}

impl SupervisorState {
    pub fn new(local_primary: bool) -> Self {
        Self {
            records: StageName::ALL
                .iter()
                .map(|&stage| (stage, StageRecord::new(stage)))
                .collect(),
            phase: Phase::Initializing,
            designation: if local_primary {
                Designation::Local
            } else {
                Designation::Remote
            },
            phase_since: Utc::now(),
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Supervisor phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.phase_since = Utc::now();
        }
    }

    pub fn set_designation(&mut self, designation: Designation) {
        if self.designation != designation {
            self.designation = designation;
            self.phase_since = Utc::now();
        }
    }

    pub fn record(&self, stage: StageName) -> &StageRecord {
        // every stage is inserted at construction
        &self.records[&stage]
    }

    pub fn record_mut(&mut self, stage: StageName) -> &mut StageRecord {
        self.records
            .entry(stage)
            .or_insert_with(|| StageRecord::new(stage))
    }

    /// Record for `stage` only when it still belongs to instance `generation`.
    pub fn current_mut(&mut self, stage: StageName, generation: u64) -> Option<&mut StageRecord> {
        let record = self.records.get_mut(&stage)?;
        if record.generation != generation {
            return None;
        }
        Some(record)
    }

    pub fn is_mandatory(&self, stage: StageName) -> bool {
        stage.always_mandatory() || self.designation == Designation::Local
    }

    pub fn mandatory_ready(&self) -> bool {
        self.records
            .values()
            .filter(|r| self.is_mandatory(r.stage))
            .all(|r| r.state.is_ready())
    }

    pub fn overall(&self) -> SupervisorStatus {
        match self.phase {
            Phase::Initializing => SupervisorStatus::Initializing,
            Phase::ShuttingDown => SupervisorStatus::ShuttingDown,
            Phase::Stopped => SupervisorStatus::Stopped,
            Phase::Started if self.mandatory_ready() => SupervisorStatus::Running,
            Phase::Started => SupervisorStatus::PartiallyDegraded,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Started && self.mandatory_ready()
    }

    pub fn last_transition(&self) -> DateTime<Utc> {
        self.records
            .values()
            .map(|r| r.state_since)
            .fold(self.phase_since, |latest, t| latest.max(t))
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            overall: self.overall(),
            stages: self
                .records
                .iter()
                .map(|(stage, record)| (*stage, record.state.clone()))
                .collect(),
            details: self
                .records
                .values()
                .map(|r| r.detail(self.is_mandatory(r.stage)))
                .collect(),
            local_primary: self.designation == Designation::Local,
            ready: self.is_ready(),
            last_transition: self.last_transition(),
            taken_at: Utc::now(),
        }
    }
}
