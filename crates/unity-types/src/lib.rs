#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
mod process;
mod snapshot;
mod stage;
mod watchdog;
mod window;

pub use error::{UnityError, UnityResult};
pub use process::{ExitOutcome, ProcessState};
pub use snapshot::{StageDetail, SupervisorSnapshot, SupervisorStatus};
pub use stage::{StageName, StartupFailure};
pub use watchdog::{QuotaReading, WatchdogSignal};
pub use window::{FocusOutcome, WindowEntry};

pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

pub const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 3;

pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 30;

pub const DEFAULT_WATCHDOG_OBSERVE_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 2;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stage_names_round_trip_through_str() {
        for stage in StageName::ALL {
            let parsed: StageName = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert_eq!("Local".parse::<StageName>().unwrap(), StageName::LocalInference);
        assert!(matches!(
            "database".parse::<StageName>(),
            Err(UnityError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_stage_order_is_start_order() {
        let mut stages = vec![StageName::Heartbeat, StageName::Backend, StageName::LocalInference];
        stages.sort();
        assert_eq!(stages, StageName::ALL.to_vec());
        assert!(StageName::Backend.always_mandatory());
        assert!(!StageName::LocalInference.always_mandatory());
    }

    #[test]
    fn test_forward_transitions() {
        use ProcessState::*;
        assert!(NotStarted.can_transition_to(&Starting));
        assert!(Starting.can_transition_to(&Ready));
        assert!(Ready.can_transition_to(&Stopping));
        assert!(Stopping.can_transition_to(&Stopped));
        assert!(!NotStarted.can_transition_to(&Ready));
        assert!(!Ready.can_transition_to(&Starting));
    }

    #[test]
    fn test_degraded_can_recover() {
        use ProcessState::*;
        assert!(Ready.can_transition_to(&Degraded));
        assert!(Degraded.can_transition_to(&Ready));
        assert!(Degraded.can_transition_to(&ProcessState::failed(Some(1), "crash")));
        assert!(!Degraded.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let failed = ProcessState::failed(Some(2), "exited");
        assert!(failed.is_terminal());
        assert!(ProcessState::Stopped.is_terminal());
        for next in [
            ProcessState::Starting,
            ProcessState::Ready,
            ProcessState::Stopping,
            ProcessState::failed(None, "again"),
        ] {
            assert!(!failed.can_transition_to(&next));
            assert!(!ProcessState::Stopped.can_transition_to(&next));
        }
    }

    #[test]
    fn test_process_state_display() {
        assert_eq!(ProcessState::Ready.to_string(), "ready");
        assert_eq!(
            ProcessState::failed(Some(3), "boom").to_string(),
            "failed (exit 3): boom"
        );
    }

    #[test]
    fn test_exit_outcome_display() {
        let outcome = ExitOutcome { code: None, signal: Some(9), forced_kill: true };
        assert_eq!(outcome.to_string(), "signal 9 (forced kill)");
        assert!(!outcome.success());
        assert!(ExitOutcome { code: Some(0), ..Default::default() }.success());
    }

    #[test]
    fn test_startup_failed_message() {
        let err = UnityError::StartupFailed {
            stage: StageName::Backend,
            reason: StartupFailure::Timeout(Duration::from_secs(15)),
        };
        let msg = err.to_string();
        assert!(msg.contains("backend"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_only_resource_exhaustion_is_fatal() {
        assert!(UnityError::ResourceExhausted("EAGAIN".into()).is_fatal());
        assert!(!UnityError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_watchdog_signal_classification() {
        assert!(WatchdogSignal::unreachable("remote").is_bad());
        assert!(WatchdogSignal::new("remote", QuotaReading::Remaining(0)).is_bad());
        assert!(!WatchdogSignal::new("remote", QuotaReading::Remaining(10)).is_bad());
    }

    #[test]
    fn test_process_state_serialization() {
        let json = serde_json::to_string(&ProcessState::failed(Some(1), "x")).unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        let stage = serde_json::to_string(&StageName::LocalInference).unwrap();
        assert_eq!(stage, "\"local-inference\"");
    }
}
