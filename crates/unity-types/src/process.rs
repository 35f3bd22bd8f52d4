use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Ready,
    Degraded,
    Stopping,
    Stopped,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
}

impl ProcessState {
    pub fn failed(exit_code: Option<i32>, reason: impl Into<String>) -> Self {
        ProcessState::Failed {
            exit_code,
            reason: reason.into(),
        }
    }

    /// Stopped and Failed end a process instance; only a restart leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed { .. })
    }

    /// A process that may currently own an OS child.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Ready | ProcessState::Degraded | ProcessState::Stopping
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProcessState::Ready)
    }

    pub fn can_transition_to(&self, next: &ProcessState) -> bool {
        use ProcessState::*;

        match (self, next) {
            (Stopped | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (NotStarted, Starting) => true,
            (Starting, Ready | Degraded | Stopping) => true,
            (Ready, Degraded | Stopping) => true,
            (Degraded, Ready | Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessState::NotStarted => "not_started",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Degraded => "degraded",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
            ProcessState::Failed { .. } => "failed",
        }
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::NotStarted
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Failed { exit_code: Some(code), reason } => {
                write!(f, "failed (exit {}): {}", code, reason)
            }
            ProcessState::Failed { exit_code: None, reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// How a child process ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub forced_kill: bool,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.forced_kill
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code)?,
            (None, Some(sig)) => write!(f, "signal {}", sig)?,
            (None, None) => write!(f, "unknown exit")?,
        }
        if self.forced_kill {
            write!(f, " (forced kill)")?;
        }
        Ok(())
    }
}
