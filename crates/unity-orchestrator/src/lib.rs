#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod diagnostics;
pub mod health;
pub mod orchestrator;
pub mod process;
pub mod supervisor;
pub mod watchdog;
pub mod windows;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{LogLevel, LoggingConfig, OrchestratorConfig, ProbeConfig, StageConfig};
pub use diagnostics::{CheckResult, DiagnosticsResult, DiagnosticsStatus, Severity};
pub use health::{HealthProbe, HttpProber, ProbeOutcome, Prober};
pub use orchestrator::Orchestrator;
pub use process::{Launcher, OsLauncher, ProbeDescriptor, ProcessHandle, ProcessSpec, Sidecar};
pub use supervisor::{CancellationToken, RestartBackoff, SidecarSupervisor};
pub use watchdog::{
    FailoverPolicy, FailoverWatchdog, HttpQuotaSource, PolicyDecision, PromotionTarget,
    QuotaSource,
};
pub use windows::{label_for, HeadlessWindowHost, WindowHost, WindowRegistry};
