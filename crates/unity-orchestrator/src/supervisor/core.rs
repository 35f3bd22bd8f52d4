use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex as SlotMutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use unity_types::{
    ExitOutcome, ProcessState, StageName, StartupFailure, SupervisorSnapshot, UnityError,
    UnityResult,
};

use super::backoff::RestartBackoff;
use super::cancellation::CancellationToken;
use super::types::{Designation, Phase, SupervisorState};
use crate::config::{OrchestratorConfig, SupervisorConfig};
use crate::health::{HealthProbe, Prober};
use crate::process::{Launcher, ProbeDescriptor, ProcessSpec, Sidecar};

type SharedResult = Shared<BoxFuture<'static, UnityResult<()>>>;

struct InFlight {
    id: u64,
    result: SharedResult,
}

struct Session {
    cancel_tx: watch::Sender<bool>,
    token: CancellationToken,
}

impl Session {
    fn new() -> Self {
        let (cancel_tx, token) = CancellationToken::new();
        Self { cancel_tx, token }
    }
}

enum Gate {
    Probe(UnityResult<()>),
    Exited(ExitOutcome),
}

struct Inner {
    specs: BTreeMap<StageName, Arc<ProcessSpec>>,
    config: SupervisorConfig,
    launcher: Arc<dyn Launcher>,
    probe: HealthProbe,
    state: Mutex<SupervisorState>,
    slots: BTreeMap<StageName, SlotMutex<()>>,
    restarts: Mutex<HashMap<StageName, InFlight>>,
    promotion: Mutex<Option<InFlight>>,
    session: Mutex<Session>,
    next_job: AtomicU64,
}

impl Inner {
    fn spec(&self, stage: StageName) -> UnityResult<Arc<ProcessSpec>> {
        self.specs
            .get(&stage)
            .cloned()
            .ok_or_else(|| UnityError::Config(format!("No process spec for stage '{}'", stage)))
    }

    fn slot(&self, stage: StageName) -> UnityResult<&SlotMutex<()>> {
        self.slots
            .get(&stage)
            .ok_or_else(|| UnityError::UnknownStage(stage.to_string()))
    }

    fn session_token(&self) -> CancellationToken {
        self.session.lock().token.clone()
    }

    fn renew_session(&self) -> CancellationToken {
        let mut session = self.session.lock();
        *session = Session::new();
        session.token.clone()
    }

    fn cancel_session(&self) {
        self.session.lock().cancel_tx.send_replace(true);
    }

    fn on_unexpected_exit(&self, stage: StageName, generation: u64, outcome: ExitOutcome) {
        let mut state = self.state.lock();
        let Some(record) = state.current_mut(stage, generation) else {
            return;
        };
        if !matches!(record.state, ProcessState::Ready | ProcessState::Degraded) {
            return;
        }
        record.last_exit = Some(outcome.clone());
        record.sidecar = None;
        record.pid = None;
        record.monitor = None;
        record.fail(outcome.code, format!("exited unexpectedly ({})", outcome));
    }

    /// Applies one monitor probe result. Returns false once the instance is gone.
    fn on_probe(&self, stage: StageName, generation: u64, healthy: bool) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.current_mut(stage, generation) else {
            return false;
        };
        match (&record.state, healthy) {
            (ProcessState::Ready, false) => {
                if record.transition(ProcessState::Degraded) {
                    warn!("Stage '{}' degraded: health probe failing", stage);
                }
            }
            (ProcessState::Degraded, true) => {
                if record.transition(ProcessState::Ready) {
                    info!("Stage '{}' recovered", stage);
                }
            }
            _ => {}
        }
        record.state.is_live()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for record in self.state.get_mut().records.values_mut() {
            if let Some(monitor) = record.take_monitor() {
                monitor.abort();
            }
        }
    }
}

/// Starts, health-gates, monitors and stops the sidecar stages.
#[derive(Clone)]
pub struct SidecarSupervisor {
    inner: Arc<Inner>,
}

impl SidecarSupervisor {
    pub fn new(
        specs: impl IntoIterator<Item = (StageName, ProcessSpec)>,
        config: SupervisorConfig,
        launcher: Arc<dyn Launcher>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let specs: BTreeMap<_, _> = specs
            .into_iter()
            .map(|(stage, spec)| (stage, Arc::new(spec)))
            .collect();
        let slots = StageName::ALL
            .iter()
            .map(|&stage| (stage, SlotMutex::new(())))
            .collect();

        Self {
            inner: Arc::new(Inner {
                specs,
                probe: HealthProbe::new(prober, config.probe_attempt_timeout()),
                state: Mutex::new(SupervisorState::new(config.local_primary)),
                config,
                launcher,
                slots,
                restarts: Mutex::new(HashMap::new()),
                promotion: Mutex::new(None),
                session: Mutex::new(Session::new()),
                next_job: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(
        config: &OrchestratorConfig,
        launcher: Arc<dyn Launcher>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self::new(config.stage_specs(), config.supervisor.clone(), launcher, prober)
    }

    /// Starts backend, local inference (when designated primary) and heartbeat in order,
    /// each gated on the previous stage being ready.
    pub async fn start_all(&self) -> UnityResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::ShuttingDown {
                return Err(UnityError::NotReady("shutdown in progress".into()));
            }
            if state.records.values().any(|r| r.state.is_live()) {
                return Err(UnityError::AlreadyRunning("supervisor".into()));
            }
            state.set_phase(Phase::Initializing);
        }

        let token = self.inner.renew_session();
        info!("Starting sidecar stages");

        for stage in StageName::ALL {
            if !self.inner.state.lock().is_mandatory(stage) {
                debug!("Skipping stage '{}': not designated primary", stage);
                continue;
            }
            if let Err(e) = self.start_stage(stage, &token).await {
                error!("Startup halted at stage '{}': {}", stage, e);
                self.finish_startup();
                return Err(e);
            }
        }

        self.finish_startup();
        info!("All mandatory stages ready");
        Ok(())
    }

    fn finish_startup(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Initializing {
            state.set_phase(Phase::Started);
        }
    }

    async fn start_stage(&self, stage: StageName, token: &CancellationToken) -> UnityResult<()> {
        let spec = self.inner.spec(stage)?;
        let _slot = self.inner.slot(stage)?.lock().await;

        if token.is_cancelled() {
            return Err(UnityError::StartupFailed {
                stage,
                reason: StartupFailure::Cancelled,
            });
        }

        let generation = {
            let mut state = self.inner.state.lock();
            let record = state.record_mut(stage);
            if record.state.is_live() {
                return Err(UnityError::AlreadyRunning(stage.to_string()));
            }
            record.begin_instance()
        };
        info!("Starting stage '{}': {}", stage, spec.command_line());

        let sidecar = match self.inner.launcher.launch(spec.clone()) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                if let Some(record) = self.inner.state.lock().current_mut(stage, generation) {
                    record.fail(None, e.to_string());
                }
                if e.is_fatal() {
                    error!("Cannot spawn processes: {}", e);
                    return Err(e);
                }
                let reason = match e {
                    UnityError::Spawn { reason, .. } => reason,
                    other => other.to_string(),
                };
                return Err(UnityError::StartupFailed {
                    stage,
                    reason: StartupFailure::Spawn(reason),
                });
            }
        };

        if let Some(record) = self.inner.state.lock().current_mut(stage, generation) {
            record.pid = sidecar.pid();
            record.sidecar = Some(sidecar.clone());
        }

        let gate = tokio::select! {
            result = self.inner.probe.await_ready(
                spec.probe(),
                spec.startup_timeout(),
                self.inner.config.poll_interval(),
                token,
            ) => Gate::Probe(result),
            outcome = sidecar.exited() => Gate::Exited(outcome),
        };

        let failure = match gate {
            Gate::Probe(Ok(())) => {
                let ready = self
                    .inner
                    .state
                    .lock()
                    .current_mut(stage, generation)
                    .map(|r| r.transition(ProcessState::Ready))
                    .unwrap_or(false);
                if ready {
                    info!("Stage '{}' ready (pid {:?})", stage, sidecar.pid());
                    self.spawn_monitor(stage, generation, sidecar, &spec);
                    return Ok(());
                }
                StartupFailure::Cancelled
            }
            Gate::Probe(Err(UnityError::Timeout(after))) => StartupFailure::Timeout(after),
            Gate::Probe(Err(UnityError::Cancelled)) => StartupFailure::Cancelled,
            Gate::Probe(Err(UnityError::Probe(reason))) => StartupFailure::Probe(reason),
            Gate::Probe(Err(other)) => StartupFailure::Probe(other.to_string()),
            Gate::Exited(outcome) => {
                if let Some(record) = self.inner.state.lock().current_mut(stage, generation) {
                    record.last_exit = Some(outcome.clone());
                }
                StartupFailure::Exited(outcome.code)
            }
        };

        let exit_code = match failure {
            StartupFailure::Exited(code) => code,
            _ => {
                if let Err(e) = sidecar.signal_stop() {
                    warn!("Failed to stop '{}' after failed startup: {}", stage, e);
                }
                let outcome = sidecar.wait(spec.shutdown_grace()).await;
                let code = outcome.code;
                if let Some(record) = self.inner.state.lock().current_mut(stage, generation) {
                    record.forced_kill = outcome.forced_kill;
                    record.last_exit = Some(outcome);
                }
                code
            }
        };

        if let Some(record) = self.inner.state.lock().current_mut(stage, generation) {
            record.sidecar = None;
            record.pid = None;
            record.fail(exit_code, failure.to_string());
        }

        Err(UnityError::StartupFailed {
            stage,
            reason: failure,
        })
    }

    fn spawn_monitor(
        &self,
        stage: StageName,
        generation: u64,
        sidecar: Arc<dyn Sidecar>,
        spec: &ProcessSpec,
    ) {
        let inner = Arc::downgrade(&self.inner);
        let probe = self.inner.probe.clone();
        let descriptor = spec.probe().clone();
        let interval = self.inner.config.monitor_interval();
        let bound = self.inner.probe.attempt_timeout().min(interval);

        let handle = tokio::spawn(monitor(
            inner, stage, generation, sidecar, probe, descriptor, interval, bound,
        ));

        let mut state = self.inner.state.lock();
        match state.current_mut(stage, generation) {
            Some(record) => record.monitor = Some(handle),
            None => handle.abort(),
        }
    }

    /// Stops one stage if it is live. Returns the exit outcome of the stopped instance.
    async fn stop_stage(&self, stage: StageName) -> Option<ExitOutcome> {
        let spec = self.inner.spec(stage).ok()?;
        let _slot = self.inner.slot(stage).ok()?.lock().await;

        let (generation, sidecar, monitor) = {
            let mut state = self.inner.state.lock();
            let record = state.record_mut(stage);
            if !record.state.is_live() {
                return None;
            }
            record.transition(ProcessState::Stopping);
            (record.generation, record.sidecar.take(), record.take_monitor())
        };

        if let Some(monitor) = monitor {
            monitor.abort();
        }

        info!("Stopping stage '{}'", stage);
        let outcome = match sidecar {
            Some(sidecar) => {
                if let Err(e) = sidecar.signal_stop() {
                    warn!("Failed to signal '{}': {}", stage, e);
                }
                Some(sidecar.wait(spec.shutdown_grace()).await)
            }
            None => None,
        };

        let mut state = self.inner.state.lock();
        if let Some(record) = state.current_mut(stage, generation) {
            record.transition(ProcessState::Stopped);
            record.pid = None;
            if let Some(ref outcome) = outcome {
                record.forced_kill = outcome.forced_kill;
                record.last_exit = Some(outcome.clone());
                if outcome.forced_kill {
                    let err = UnityError::ForcedKill(stage.to_string());
                    warn!("{}", err);
                    record.last_error = Some(err.to_string());
                }
            }
        }
        info!("Stage '{}' stopped", stage);
        outcome
    }

    /// Cancels in-flight startups, then stops live stages in reverse start order.
    pub async fn stop_all(&self) {
        self.inner.state.lock().set_phase(Phase::ShuttingDown);
        self.inner.cancel_session();
        info!("Stopping all stages");

        let mut forced = 0;
        for stage in StageName::ALL.iter().rev() {
            if let Some(outcome) = self.stop_stage(*stage).await {
                if outcome.forced_kill {
                    forced += 1;
                }
            }
        }

        self.inner.state.lock().set_phase(Phase::Stopped);
        if forced > 0 {
            warn!("All stages stopped ({} forced kill(s))", forced);
        } else {
            info!("All stages stopped");
        }
    }

    /// Stops and re-starts `stage`. Concurrent calls for the same stage share one attempt.
    pub async fn restart(&self, stage: StageName) -> UnityResult<()> {
        self.begin_restart(stage, true)?.await
    }

    /// Like `restart`, but rejects with `RestartInProgress` instead of joining.
    pub async fn try_restart(&self, stage: StageName) -> UnityResult<()> {
        self.begin_restart(stage, false)?.await
    }

    fn begin_restart(&self, stage: StageName, join: bool) -> UnityResult<SharedResult> {
        {
            let state = self.inner.state.lock();
            if matches!(state.phase, Phase::ShuttingDown | Phase::Stopped) {
                return Err(UnityError::NotReady(format!(
                    "cannot restart '{}' after shutdown",
                    stage
                )));
            }
        }

        let mut restarts = self.inner.restarts.lock();
        if let Some(existing) = restarts.get(&stage) {
            if !join {
                return Err(UnityError::RestartInProgress(stage));
            }
            debug!("Joining in-flight restart of '{}'", stage);
            return Ok(existing.result.clone());
        }

        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.run_restart(stage).await;
            let mut restarts = this.inner.restarts.lock();
            if restarts.get(&stage).map(|f| f.id) == Some(id) {
                restarts.remove(&stage);
            }
            result
        });

        let result = async move {
            task.await
                .unwrap_or_else(|e| Err(UnityError::Internal(format!("restart task failed: {}", e))))
        }
        .boxed()
        .shared();

        restarts.insert(stage, InFlight { id, result: result.clone() });
        Ok(result)
    }

    async fn run_restart(&self, stage: StageName) -> UnityResult<()> {
        let token = self.inner.session_token();
        info!("Restarting stage '{}'", stage);
        self.stop_stage(stage).await;

        let config = &self.inner.config;
        let mut backoff = RestartBackoff::new(
            config.restart_backoff_base(),
            config.restart_backoff_max(),
            config.max_restart_attempts.max(1),
        );

        loop {
            self.inner.state.lock().record_mut(stage).restarts += 1;

            match self.start_stage(stage, &token).await {
                Ok(()) => {
                    info!("Stage '{}' restarted", stage);
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let Some(delay) = backoff.next_delay() else {
                        error!(
                            "Giving up on '{}' after {} attempts: {}",
                            stage,
                            backoff.retries() + 1,
                            e
                        );
                        return Err(e);
                    };
                    warn!(
                        "Restart attempt {} of '{}' failed: {}. Retrying in {:?}",
                        backoff.retries(),
                        stage,
                        e,
                        delay
                    );
                    let mut cancel = token.clone();
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(e),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Starts the local inference stage if needed and designates it primary once ready.
    pub async fn promote_local(&self) -> UnityResult<()> {
        let shared = {
            let mut promotion = self.inner.promotion.lock();
            match promotion.as_ref() {
                Some(existing) => existing.result.clone(),
                None => {
                    {
                        let mut state = self.inner.state.lock();
                        if state.designation == Designation::Local {
                            return Ok(());
                        }
                        if matches!(state.phase, Phase::ShuttingDown | Phase::Stopped) {
                            return Err(UnityError::NotReady("cannot promote after shutdown".into()));
                        }
                        state.set_designation(Designation::Promoting);
                    }

                    let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
                    let this = self.clone();
                    let task = tokio::spawn(async move {
                        let result = this.run_promotion().await;
                        let mut promotion = this.inner.promotion.lock();
                        if promotion.as_ref().map(|p| p.id) == Some(id) {
                            *promotion = None;
                        }
                        result
                    });
                    let result = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(UnityError::Internal(format!("promotion task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();

                    *promotion = Some(InFlight { id, result: result.clone() });
                    result
                }
            }
        };
        shared.await
    }

    async fn run_promotion(&self) -> UnityResult<()> {
        let stage = StageName::LocalInference;
        info!("Promoting local inference runtime");

        let current = self.inner.state.lock().record(stage).state.clone();
        let mut result = match current {
            ProcessState::Ready => Ok(()),
            state if state.is_live() => self.restart(stage).await,
            _ => {
                let token = self.inner.session_token();
                self.start_stage(stage, &token).await
            }
        };

        let mut state = self.inner.state.lock();
        if result.is_ok() && !state.record(stage).state.is_ready() {
            result = Err(UnityError::Internal("local stage left Ready during promotion".into()));
        }
        match result {
            Ok(()) => {
                state.set_designation(Designation::Local);
                info!("Local inference runtime is now primary");
            }
            Err(ref e) => {
                state.set_designation(Designation::Remote);
                warn!("Promotion of local inference failed: {}", e);
            }
        }
        result
    }

    /// Withdraws the local designation and stops the local stage.
    pub async fn demote_local(&self) -> UnityResult<()> {
        let pending = self.inner.promotion.lock().as_ref().map(|p| p.result.clone());
        if let Some(pending) = pending {
            let _ = pending.await;
        }

        self.inner.state.lock().set_designation(Designation::Remote);
        self.stop_stage(StageName::LocalInference).await;
        info!("Local inference runtime demoted");
        Ok(())
    }

    pub fn status(&self) -> SupervisorSnapshot {
        self.inner.state.lock().snapshot()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().is_ready()
    }

    pub fn local_primary(&self) -> bool {
        self.inner.state.lock().designation == Designation::Local
    }

    pub fn stage_state(&self, stage: StageName) -> ProcessState {
        self.inner.state.lock().record(stage).state.clone()
    }

    pub fn spec(&self, stage: StageName) -> Option<&ProcessSpec> {
        self.inner.specs.get(&stage).map(|s| s.as_ref())
    }
}

#[allow(clippy::too_many_arguments)]
async fn monitor(
    inner: Weak<Inner>,
    stage: StageName,
    generation: u64,
    sidecar: Arc<dyn Sidecar>,
    probe: HealthProbe,
    descriptor: ProbeDescriptor,
    interval: Duration,
    bound: Duration,
) {
    let repeatable = descriptor.is_repeatable();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            outcome = sidecar.exited() => {
                if let Some(inner) = inner.upgrade() {
                    inner.on_unexpected_exit(stage, generation, outcome);
                }
                break;
            }
            _ = ticker.tick(), if repeatable => {
                let healthy = probe.probe_once(&descriptor, bound).await.is_ready();
                let Some(inner) = inner.upgrade() else { break };
                if !inner.on_probe(stage, generation, healthy) {
                    break;
                }
            }
        }
    }
    debug!("Monitor for '{}' (instance {}) ended", stage, generation);
}
