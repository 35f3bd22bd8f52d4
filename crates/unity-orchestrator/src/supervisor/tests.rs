use std::time::Duration;
use tokio::time::Instant;
use unity_types::{ProcessState, StageName, StartupFailure, SupervisorStatus, UnityError};

use crate::config::SupervisorConfig;
use crate::health::ProbeOutcome;
use crate::testing::{Harness, LaunchBehavior, BACKEND_URL, LOCAL_URL};

const BACKEND: StageName = StageName::Backend;
const LOCAL: StageName = StageName::LocalInference;
const HEARTBEAT: StageName = StageName::Heartbeat;

fn position(events: &[String], needle: &str) -> usize {
    events
        .iter()
        .position(|e| e == needle)
        .unwrap_or_else(|| panic!("missing event {needle} in {events:?}"))
}

#[tokio::test(start_paused = true)]
async fn test_start_all_gates_each_stage_on_readiness() {
    let harness = Harness::new(SupervisorConfig::default());
    let prober = harness.prober.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        prober.set(BACKEND_URL, ProbeOutcome::Ready);
    });

    harness.supervisor.start_all().await.unwrap();

    let events = harness.events();
    let backend_ready = position(&events, &format!("ready:{}", BACKEND_URL));
    assert!(position(&events, "launch:backend") < backend_ready);
    assert!(backend_ready < position(&events, "launch:heartbeat"));

    let status = harness.supervisor.status();
    assert_eq!(status.overall, SupervisorStatus::Running);
    assert!(harness.supervisor.is_ready());
    assert_eq!(harness.launcher.launches(LOCAL), 0);
    assert_eq!(status.state_of(LOCAL), Some(&ProcessState::NotStarted));
}

#[tokio::test(start_paused = true)]
async fn test_backend_never_ready_halts_startup() {
    let harness = Harness::new(SupervisorConfig::default());
    let started = Instant::now();

    let result = harness.supervisor.start_all().await;

    assert_eq!(
        result,
        Err(UnityError::StartupFailed {
            stage: BACKEND,
            reason: StartupFailure::Timeout(Duration::from_secs(15)),
        })
    );
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(harness.launcher.launches(HEARTBEAT), 0);
    assert_eq!(harness.supervisor.stage_state(HEARTBEAT), ProcessState::NotStarted);
    assert!(harness.supervisor.stage_state(BACKEND).is_terminal());
    assert_eq!(harness.launcher.live_count(BACKEND), 0);
    assert!(!harness.supervisor.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_is_startup_failure() {
    let harness = Harness::healthy();
    harness
        .launcher
        .set(BACKEND, LaunchBehavior::SpawnError("executable not found".into()));

    let result = harness.supervisor.start_all().await;

    assert_eq!(
        result,
        Err(UnityError::StartupFailed {
            stage: BACKEND,
            reason: StartupFailure::Spawn("executable not found".into()),
        })
    );
    assert_eq!(harness.launcher.launches(HEARTBEAT), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resource_exhaustion_is_fatal() {
    let harness = Harness::healthy();
    harness.launcher.set(BACKEND, LaunchBehavior::Exhausted);

    let err = harness.supervisor.start_all().await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_exit_during_startup_records_code() {
    let harness = Harness::healthy();
    harness.launcher.set(HEARTBEAT, LaunchBehavior::ExitImmediately(3));

    let result = harness.supervisor.start_all().await;

    assert_eq!(
        result,
        Err(UnityError::StartupFailed {
            stage: HEARTBEAT,
            reason: StartupFailure::Exited(Some(3)),
        })
    );
    match harness.supervisor.stage_state(HEARTBEAT) {
        ProcessState::Failed { exit_code, .. } => assert_eq!(exit_code, Some(3)),
        other => panic!("unexpected state {other}"),
    }
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::PartiallyDegraded);
}

#[tokio::test(start_paused = true)]
async fn test_local_primary_starts_between_backend_and_heartbeat() {
    let config = SupervisorConfig {
        local_primary: true,
        ..Default::default()
    };
    let harness = Harness::new(config);
    harness.prober.set(BACKEND_URL, ProbeOutcome::Ready);
    harness.prober.set(LOCAL_URL, ProbeOutcome::Ready);

    harness.supervisor.start_all().await.unwrap();

    let events = harness.events();
    assert!(position(&events, "launch:backend") < position(&events, "launch:local-inference"));
    assert!(
        position(&events, &format!("ready:{}", LOCAL_URL)) < position(&events, "launch:heartbeat")
    );
    assert!(harness.supervisor.local_primary());
    assert!(harness.supervisor.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_second_start_all_is_rejected() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    let result = harness.supervisor.start_all().await;
    assert!(matches!(result, Err(UnityError::AlreadyRunning(_))));
    assert_eq!(harness.launcher.launches(BACKEND), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_stops_every_live_stage() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    harness.supervisor.stop_all().await;

    let status = harness.supervisor.status();
    assert_eq!(status.overall, SupervisorStatus::Stopped);
    assert_eq!(status.state_of(BACKEND), Some(&ProcessState::Stopped));
    assert_eq!(status.state_of(HEARTBEAT), Some(&ProcessState::Stopped));
    assert!(status.stages.values().all(|s| !s.is_live()));
    assert_eq!(harness.launcher.live_count(BACKEND), 0);
    assert_eq!(harness.launcher.live_count(HEARTBEAT), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_stage_is_force_killed() {
    let harness = Harness::healthy();
    harness.launcher.set(HEARTBEAT, LaunchBehavior::Stubborn);
    harness.supervisor.start_all().await.unwrap();

    let started = Instant::now();
    harness.supervisor.stop_all().await;
    assert!(started.elapsed() >= Duration::from_secs(5));

    let status = harness.supervisor.status();
    let detail = status.detail(HEARTBEAT).unwrap();
    assert_eq!(detail.state, ProcessState::Stopped);
    assert!(detail.forced_kill);
    assert_eq!(detail.last_exit.as_ref().and_then(|e| e.signal), Some(9));
    assert!(detail.last_error.as_deref().unwrap().contains("heartbeat"));
    assert!(!status.detail(BACKEND).unwrap().forced_kill);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_cancels_startup_in_progress() {
    let harness = Harness::new(SupervisorConfig::default());
    let supervisor = harness.supervisor.clone();
    let startup = tokio::spawn(async move { supervisor.start_all().await });

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stopping_at = Instant::now();
    harness.supervisor.stop_all().await;

    let result = startup.await.unwrap();
    assert_eq!(
        result,
        Err(UnityError::StartupFailed {
            stage: BACKEND,
            reason: StartupFailure::Cancelled,
        })
    );
    assert!(stopping_at.elapsed() < Duration::from_secs(6));
    assert_eq!(harness.launcher.launches(HEARTBEAT), 0);
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_restarts_share_one_attempt() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();
    let before = harness.launcher.launches(HEARTBEAT);

    let (first, second) = tokio::join!(
        harness.supervisor.restart(HEARTBEAT),
        harness.supervisor.restart(HEARTBEAT),
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(harness.launcher.launches(HEARTBEAT), before + 1);
    assert_eq!(harness.launcher.live_count(HEARTBEAT), 1);
    assert_eq!(harness.supervisor.stage_state(HEARTBEAT), ProcessState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_try_restart_rejects_while_in_flight() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    let (first, second) = tokio::join!(harness.supervisor.restart(HEARTBEAT), async {
        tokio::task::yield_now().await;
        harness.supervisor.try_restart(HEARTBEAT).await
    });

    assert!(first.is_ok());
    assert_eq!(second, Err(UnityError::RestartInProgress(HEARTBEAT)));

    // once settled a new restart is accepted again
    assert!(harness.supervisor.try_restart(HEARTBEAT).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_restart_gives_up_after_max_attempts() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();
    harness
        .prober
        .set(BACKEND_URL, ProbeOutcome::Fatal("404 Not Found".into()));

    let result = harness.supervisor.restart(BACKEND).await;

    assert!(matches!(
        result,
        Err(UnityError::StartupFailed {
            stage: BACKEND,
            reason: StartupFailure::Probe(_),
        })
    ));
    assert_eq!(harness.launcher.launches(BACKEND), 1 + 3);
    let status = harness.supervisor.status();
    assert_eq!(status.detail(BACKEND).unwrap().restarts, 3);
    assert_eq!(harness.launcher.live_count(BACKEND), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_rejected_after_shutdown() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();
    harness.supervisor.stop_all().await;

    let result = harness.supervisor.restart(BACKEND).await;
    assert!(matches!(result, Err(UnityError::NotReady(_))));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_marks_crashed_stage_failed() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    harness.launcher.latest(HEARTBEAT).unwrap().crash(1);
    tokio::time::sleep(Duration::from_millis(10)).await;

    match harness.supervisor.stage_state(HEARTBEAT) {
        ProcessState::Failed { exit_code, .. } => assert_eq!(exit_code, Some(1)),
        other => panic!("unexpected state {other}"),
    }
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::PartiallyDegraded);

    harness.supervisor.restart(HEARTBEAT).await.unwrap();
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_degrades_and_recovers() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    harness
        .prober
        .set(BACKEND_URL, ProbeOutcome::NotYet("503".into()));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(harness.supervisor.stage_state(BACKEND), ProcessState::Degraded);
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::PartiallyDegraded);

    harness.prober.set(BACKEND_URL, ProbeOutcome::Ready);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.supervisor.stage_state(BACKEND), ProcessState::Ready);
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_promote_local_designates_primary() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();
    harness.prober.set(LOCAL_URL, ProbeOutcome::Ready);

    harness.supervisor.promote_local().await.unwrap();

    assert!(harness.supervisor.local_primary());
    assert_eq!(harness.supervisor.stage_state(LOCAL), ProcessState::Ready);
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Running);

    // already primary
    harness.supervisor.promote_local().await.unwrap();
    assert_eq!(harness.launcher.launches(LOCAL), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_promotion_stays_remote() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();

    let result = harness.supervisor.promote_local().await;

    assert!(matches!(
        result,
        Err(UnityError::StartupFailed {
            stage: LOCAL,
            reason: StartupFailure::Timeout(_),
        })
    ));
    assert!(!harness.supervisor.local_primary());
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_demote_stops_local_stage() {
    let harness = Harness::healthy();
    harness.supervisor.start_all().await.unwrap();
    harness.prober.set(LOCAL_URL, ProbeOutcome::Ready);
    harness.supervisor.promote_local().await.unwrap();

    harness.supervisor.demote_local().await.unwrap();

    assert!(!harness.supervisor.local_primary());
    assert_eq!(harness.supervisor.stage_state(LOCAL), ProcessState::Stopped);
    assert_eq!(harness.launcher.live_count(LOCAL), 0);
    assert_eq!(harness.supervisor.status().overall, SupervisorStatus::Running);
}
