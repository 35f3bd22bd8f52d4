//! Scriptable launcher, sidecar and prober doubles for supervisor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use unity_types::{ExitOutcome, StageName, UnityError, UnityResult};

use crate::config::SupervisorConfig;
use crate::health::{ProbeOutcome, Prober};
use crate::process::{HandleStatus, Launcher, ProbeDescriptor, ProcessSpec, Sidecar};
use crate::supervisor::SidecarSupervisor;

pub const BACKEND_URL: &str = "http://backend.test/health";
pub const LOCAL_URL: &str = "http://local.test/api/tags";

pub type Events = Arc<Mutex<Vec<String>>>;

pub struct FakeSidecar {
    name: String,
    pid: u32,
    stubborn: bool,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
}

impl FakeSidecar {
    pub fn crash(&self, code: i32) {
        self.finish(ExitOutcome {
            code: Some(code),
            ..Default::default()
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    fn finish(&self, outcome: ExitOutcome) {
        self.exit_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(outcome);
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Sidecar for FakeSidecar {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn signal_stop(&self) -> UnityResult<()> {
        if !self.stubborn {
            self.finish(ExitOutcome {
                signal: Some(15),
                ..Default::default()
            });
        }
        Ok(())
    }

    async fn wait(&self, grace: Duration) -> ExitOutcome {
        if let Ok(outcome) = tokio::time::timeout(grace, self.exited()).await {
            return outcome;
        }
        self.finish(ExitOutcome {
            signal: Some(9),
            forced_kill: true,
            ..Default::default()
        });
        self.exited().await
    }

    async fn exited(&self) -> ExitOutcome {
        let mut rx = self.exit_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return ExitOutcome::default();
            }
        }
    }

    fn exit_status(&self) -> HandleStatus {
        match self.exit_tx.borrow().clone() {
            Some(outcome) => HandleStatus::Exited(outcome),
            None => HandleStatus::Running,
        }
    }
}

#[derive(Clone, Debug)]
pub enum LaunchBehavior {
    Normal,
    Stubborn,
    SpawnError(String),
    Exhausted,
    ExitImmediately(i32),
}

#[derive(Default)]
pub struct FakeLauncher {
    behaviors: Mutex<HashMap<String, LaunchBehavior>>,
    launched: Mutex<Vec<Arc<FakeSidecar>>>,
    events: Events,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new(events: Events) -> Arc<Self> {
        Arc::new(Self {
            events,
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        })
    }

    pub fn set(&self, stage: StageName, behavior: LaunchBehavior) {
        self.behaviors.lock().insert(stage.as_str().to_string(), behavior);
    }

    pub fn launches(&self, stage: StageName) -> usize {
        self.launched
            .lock()
            .iter()
            .filter(|s| s.name() == stage.as_str())
            .count()
    }

    /// Most recently launched sidecar of `stage`.
    pub fn latest(&self, stage: StageName) -> Option<Arc<FakeSidecar>> {
        self.launched
            .lock()
            .iter()
            .rev()
            .find(|s| s.name() == stage.as_str())
            .cloned()
    }

    pub fn live_count(&self, stage: StageName) -> usize {
        self.launched
            .lock()
            .iter()
            .filter(|s| s.name() == stage.as_str() && !s.has_exited())
            .count()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, spec: Arc<ProcessSpec>) -> UnityResult<Arc<dyn Sidecar>> {
        let behavior = self
            .behaviors
            .lock()
            .get(spec.name())
            .cloned()
            .unwrap_or(LaunchBehavior::Normal);

        match behavior {
            LaunchBehavior::SpawnError(reason) => {
                return Err(UnityError::Spawn {
                    name: spec.name().to_string(),
                    reason,
                })
            }
            LaunchBehavior::Exhausted => {
                return Err(UnityError::ResourceExhausted("fork: EAGAIN".into()))
            }
            _ => {}
        }

        self.events.lock().push(format!("launch:{}", spec.name()));
        let (exit_tx, _) = watch::channel(None);
        let sidecar = Arc::new(FakeSidecar {
            name: spec.name().to_string(),
            pid: self.next_pid.fetch_add(1, Ordering::Relaxed),
            stubborn: matches!(behavior, LaunchBehavior::Stubborn),
            exit_tx,
        });
        if let LaunchBehavior::ExitImmediately(code) = behavior {
            sidecar.crash(code);
        }
        self.launched.lock().push(sidecar.clone());
        Ok(sidecar)
    }
}

/// Answers probes per URL; unknown URLs are not ready.
pub struct FakeProber {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    events: Events,
}

impl FakeProber {
    pub fn new(events: Events) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn set(&self, url: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().insert(url.to_string(), outcome);
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, descriptor: &ProbeDescriptor) -> ProbeOutcome {
        let url = match descriptor {
            ProbeDescriptor::Http { url, .. } => url.clone(),
            ProbeDescriptor::Tcp { addr } => addr.clone(),
            _ => return ProbeOutcome::Ready,
        };
        let outcome = self
            .outcomes
            .lock()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::NotYet("connection refused".into()));
        if outcome.is_ready() {
            self.events.lock().push(format!("ready:{}", url));
        }
        outcome
    }
}

pub fn stage_specs() -> Vec<(StageName, ProcessSpec)> {
    vec![
        (
            StageName::Backend,
            ProcessSpec::new("backend", "fake-backend")
                .with_probe(ProbeDescriptor::http(BACKEND_URL))
                .with_startup_timeout(Duration::from_secs(15))
                .with_shutdown_grace(Duration::from_secs(5)),
        ),
        (
            StageName::LocalInference,
            ProcessSpec::new("local-inference", "fake-ollama")
                .with_probe(ProbeDescriptor::http(LOCAL_URL))
                .with_startup_timeout(Duration::from_secs(30))
                .with_shutdown_grace(Duration::from_secs(5)),
        ),
        (
            StageName::Heartbeat,
            ProcessSpec::new("heartbeat", "fake-heartbeat")
                .with_probe(ProbeDescriptor::Liveness {
                    settle: Duration::from_secs(2),
                })
                .with_startup_timeout(Duration::from_secs(15))
                .with_shutdown_grace(Duration::from_secs(5)),
        ),
    ]
}

pub struct Harness {
    pub supervisor: SidecarSupervisor,
    pub launcher: Arc<FakeLauncher>,
    pub prober: Arc<FakeProber>,
    pub events: Events,
}

impl Harness {
    pub fn new(config: SupervisorConfig) -> Self {
        let events: Events = Arc::default();
        let launcher = FakeLauncher::new(events.clone());
        let prober = FakeProber::new(events.clone());
        let supervisor =
            SidecarSupervisor::new(stage_specs(), config, launcher.clone(), prober.clone());
        Self {
            supervisor,
            launcher,
            prober,
            events,
        }
    }

    /// Backend probe answers ready.
    pub fn healthy() -> Self {
        let harness = Self::new(SupervisorConfig::default());
        harness.prober.set(BACKEND_URL, ProbeOutcome::Ready);
        harness
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}
