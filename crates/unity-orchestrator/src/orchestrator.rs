use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use unity_types::{StageName, SupervisorSnapshot, UnityError, UnityResult, WindowEntry};

use crate::config::OrchestratorConfig;
use crate::diagnostics::{self, DiagnosticsResult};
use crate::health::{HttpProber, Prober};
use crate::process::{Launcher, OsLauncher};
use crate::supervisor::{CancellationToken, SidecarSupervisor};
use crate::watchdog::{FailoverWatchdog, HttpQuotaSource, QuotaSource};
use crate::windows::{HeadlessWindowHost, WindowHost, WindowRegistry};

const WATCHDOG_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct WatchdogTask {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Entry point for the desktop shell: owns the supervisor, the window registry and the
/// failover watchdog.
pub struct Orchestrator {
    config: OrchestratorConfig,
    supervisor: SidecarSupervisor,
    windows: WindowRegistry,
    watchdog: Option<Arc<FailoverWatchdog>>,
    watchdog_task: Mutex<Option<WatchdogTask>>,
    fatal: Mutex<Option<String>>,
    shutting_down: AtomicBool,
}

impl Orchestrator {
    /// Real processes, HTTP probes and a headless window host.
    pub fn new(config: OrchestratorConfig) -> UnityResult<Self> {
        let prober = HttpProber::new(config.supervisor.probe_attempt_timeout())?;
        let quota: Option<Arc<dyn QuotaSource>> = match config.watchdog.usage_url.as_ref() {
            Some(url) if config.watchdog.is_active() => Some(Arc::new(HttpQuotaSource::new(
                url.clone(),
                config.watchdog.observe_timeout(),
            )?)),
            _ => None,
        };

        Ok(Self::with_parts(
            config,
            Arc::new(OsLauncher),
            Arc::new(prober),
            Arc::new(HeadlessWindowHost::new()),
            quota,
        ))
    }

    pub fn with_parts(
        config: OrchestratorConfig,
        launcher: Arc<dyn Launcher>,
        prober: Arc<dyn Prober>,
        host: Arc<dyn WindowHost>,
        quota: Option<Arc<dyn QuotaSource>>,
    ) -> Self {
        let supervisor = SidecarSupervisor::from_config(&config, launcher, prober);
        let watchdog = quota.map(|source| {
            Arc::new(FailoverWatchdog::new(
                config.watchdog.clone(),
                source,
                Arc::new(supervisor.clone()),
            ))
        });

        Self {
            config,
            supervisor,
            windows: WindowRegistry::new(host),
            watchdog,
            watchdog_task: Mutex::new(None),
            fatal: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Starts the stages in order, then the failover watchdog.
    ///
    /// The watchdog also runs after a stage-local startup failure once the backend is up,
    /// so failover stays available while the failed stage is restarted.
    pub async fn start(&self) -> UnityResult<()> {
        if let Some(reason) = self.fatal.lock().clone() {
            return Err(UnityError::ResourceExhausted(reason));
        }

        if let Err(e) = self.supervisor.start_all().await {
            self.record_failure(&e);
            if !e.is_fatal() && self.supervisor.stage_state(StageName::Backend).is_live() {
                self.spawn_watchdog();
            }
            return Err(e);
        }

        self.spawn_watchdog();
        info!("Orchestrator started");
        Ok(())
    }

    fn spawn_watchdog(&self) {
        let mut slot = self.watchdog_task.lock();
        if slot.is_some() || self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(watchdog) = self.watchdog.clone() else {
            debug!("Failover watchdog inactive (no usage source configured)");
            return;
        };

        let (cancel_tx, token) = CancellationToken::new();
        let handle = tokio::spawn(async move { watchdog.run(token).await });
        *slot = Some(WatchdogTask { cancel_tx, handle });
    }

    fn record_failure(&self, err: &UnityError) {
        if !err.is_fatal() {
            return;
        }
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            error!("Fatal: {}", err);
            *fatal = Some(err.to_string());
        }
    }

    /// Stops the watchdog, forgets the windows, then stops the stages.
    pub async fn shutdown(&self) {
        info!("Orchestrator shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);

        let task = self.watchdog_task.lock().take();
        if let Some(task) = task {
            task.cancel_tx.send_replace(true);
            let abort = task.handle.abort_handle();
            if tokio::time::timeout(WATCHDOG_STOP_TIMEOUT, task.handle).await.is_err() {
                warn!("Watchdog did not stop in time, aborting");
                abort.abort();
            }
        }

        self.windows.close_all();
        self.supervisor.stop_all().await;
        info!("Orchestrator stopped");
    }

    pub fn diagnostics(&self) -> DiagnosticsResult {
        let fatal = self.fatal.lock().clone();
        diagnostics::from_snapshot(&self.supervisor.status(), fatal.as_deref())
    }

    pub async fn preflight(&self) -> DiagnosticsResult {
        diagnostics::preflight(&self.config, self.supervisor.local_primary()).await
    }

    pub fn status(&self) -> SupervisorSnapshot {
        self.supervisor.status()
    }

    pub fn is_ready(&self) -> bool {
        self.fatal.lock().is_none() && self.supervisor.is_ready()
    }

    pub fn ensure_ready(&self) -> UnityResult<()> {
        if let Some(reason) = self.fatal.lock().as_ref() {
            return Err(UnityError::NotReady(format!("fatal condition: {}", reason)));
        }
        if !self.supervisor.is_ready() {
            return Err(UnityError::NotReady(format!(
                "supervisor {}",
                self.supervisor.status().overall
            )));
        }
        Ok(())
    }

    pub async fn open_task_window(&self, task: &str) -> UnityResult<String> {
        self.ensure_ready()?;
        self.windows.open(task).await
    }

    pub fn close_task_window(&self, task: &str) -> bool {
        self.windows.close(task)
    }

    pub fn window_closed(&self, label: &str) -> bool {
        self.windows.host_closed(label)
    }

    pub fn open_windows(&self) -> Vec<WindowEntry> {
        self.windows.list_open()
    }

    pub async fn restart_stage(&self, stage_name: &str) -> UnityResult<()> {
        let stage: StageName = stage_name.parse()?;
        let result = self.supervisor.restart(stage).await;
        match result {
            Ok(()) => self.spawn_watchdog(),
            Err(ref e) => self.record_failure(e),
        }
        result
    }

    /// Hands the primary role back to the remote dependency.
    pub async fn reset_failover(&self) -> UnityResult<()> {
        match self.watchdog.as_ref() {
            Some(watchdog) => watchdog.reset().await,
            None => self.supervisor.demote_local().await,
        }
    }

    pub fn supervisor(&self) -> &SidecarSupervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn failover_promoted(&self) -> bool {
        self.watchdog.as_ref().map_or(false, |w| w.is_promoted())
    }
}
