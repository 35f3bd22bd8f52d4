use crate::{StageName, StartupFailure};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnityError {
    #[error("Failed to spawn '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("Resource exhaustion: {0}")]
    ResourceExhausted(String),

    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Process '{0}' did not exit within its grace period and was killed")]
    ForcedKill(String),

    #[error("Stage '{stage}' failed to start: {reason}")]
    StartupFailed {
        stage: StageName,
        reason: StartupFailure,
    },

    #[error("Restart of stage '{0}' already in progress")]
    RestartInProgress(StageName),

    #[error("Failed to open window for task '{task}': {reason}")]
    WindowOpen { task: String, reason: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Orchestrator not ready: {0}")]
    NotReady(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UnityError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, UnityError::ResourceExhausted(_))
    }
}

pub type UnityResult<T> = Result<T, UnityError>;
