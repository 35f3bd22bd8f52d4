use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use unity_types::{ExitOutcome, UnityError, UnityResult};

use super::launcher::Sidecar;
use super::spec::ProcessSpec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    NotStarted,
    Running,
    Exited(ExitOutcome),
}

struct Running {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// Exclusive owner of one child process.
///
/// A reaper task owns the `Child` and publishes its exit outcome; the handle keeps the
/// kill switch. Dropping the handle drops the switch, which makes the reaper kill the child.
pub struct ProcessHandle {
    spec: Arc<ProcessSpec>,
    running: Option<Running>,
}

impl ProcessHandle {
    pub fn new(spec: Arc<ProcessSpec>) -> Self {
        Self { spec, running: None }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.pid)
    }

    pub fn start(&mut self) -> UnityResult<()> {
        if matches!(self.exit_status(), HandleStatus::Running) {
            return Err(UnityError::AlreadyRunning(self.spec.name().to_string()));
        }

        let mut command = Command::new(self.spec.program());
        command
            .args(self.spec.args())
            .envs(self.spec.env())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = self.spec.working_dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| spawn_error(self.spec.name(), &e))?;
        let pid = child.id();

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let name = self.spec.name().to_string();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => outcome_from(status, false),
                _ = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        debug!("Kill of '{}' failed: {}", name, e);
                    }
                    outcome_from(child.wait().await, true)
                }
            };
            debug!("Process '{}' exited: {}", name, outcome);
            exit_tx.send_replace(Some(outcome));
        });

        info!("Spawned '{}' (pid {:?}): {}", self.spec.name(), pid, self.spec.command_line());

        self.running = Some(Running {
            pid,
            exit_rx,
            kill_tx: Mutex::new(Some(kill_tx)),
        });
        Ok(())
    }

    /// Requests a graceful stop and returns without waiting.
    pub fn signal_stop(&self) -> UnityResult<()> {
        let Some(running) = self.running.as_ref() else {
            return Ok(());
        };
        if running.exit_rx.borrow().is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = running.pid {
                debug!("Sending SIGTERM to '{}' (pid {})", self.spec.name(), pid);
                return match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) => Ok(()),
                    Err(nix::errno::Errno::ESRCH) => Ok(()),
                    Err(e) => Err(UnityError::Internal(format!(
                        "Failed to signal '{}': {}",
                        self.spec.name(),
                        e
                    ))),
                };
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.force_kill();
            Ok(())
        }
    }

    /// Waits up to `grace` for exit, then kills. The outcome carries `forced_kill` when
    /// the grace period ran out.
    pub async fn wait(&self, grace: Duration) -> ExitOutcome {
        let Some(running) = self.running.as_ref() else {
            return ExitOutcome::default();
        };

        let mut rx = running.exit_rx.clone();
        if let Ok(outcome) = tokio::time::timeout(grace, wait_exit(&mut rx)).await {
            return outcome;
        }

        warn!(
            "Process '{}' did not exit within {:?}, killing",
            self.spec.name(),
            grace
        );
        self.force_kill();
        let mut outcome = wait_exit(&mut rx).await;
        outcome.forced_kill = true;
        outcome
    }

    pub fn exit_status(&self) -> HandleStatus {
        match self.running.as_ref() {
            None => HandleStatus::NotStarted,
            Some(running) => match running.exit_rx.borrow().clone() {
                Some(outcome) => HandleStatus::Exited(outcome),
                None => HandleStatus::Running,
            },
        }
    }

    pub async fn exited(&self) -> ExitOutcome {
        match self.running.as_ref() {
            Some(running) => wait_exit(&mut running.exit_rx.clone()).await,
            None => std::future::pending().await,
        }
    }

    fn force_kill(&self) {
        if let Some(running) = self.running.as_ref() {
            if let Some(tx) = running.kill_tx.lock().take() {
                let _ = tx.send(());
            }
        }
    }
}

#[async_trait]
impl Sidecar for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        ProcessHandle::pid(self)
    }

    fn signal_stop(&self) -> UnityResult<()> {
        ProcessHandle::signal_stop(self)
    }

    async fn wait(&self, grace: Duration) -> ExitOutcome {
        ProcessHandle::wait(self, grace).await
    }

    async fn exited(&self) -> ExitOutcome {
        ProcessHandle::exited(self).await
    }

    fn exit_status(&self) -> HandleStatus {
        ProcessHandle::exit_status(self)
    }
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitOutcome>>) -> ExitOutcome {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone().unwrap_or_default();
        }
    }
}

fn outcome_from(status: std::io::Result<ExitStatus>, forced_kill: bool) -> ExitOutcome {
    match status {
        Ok(status) => ExitOutcome {
            code: status.code(),
            signal: exit_signal(&status),
            forced_kill,
        },
        Err(_) => ExitOutcome {
            forced_kill,
            ..Default::default()
        },
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn spawn_error(name: &str, err: &std::io::Error) -> UnityError {
    if is_resource_exhaustion(err) {
        return UnityError::ResourceExhausted(format!("cannot spawn '{}': {}", name, err));
    }

    let reason = match err.kind() {
        std::io::ErrorKind::NotFound => format!("executable not found ({})", err),
        std::io::ErrorKind::PermissionDenied => format!("permission denied ({})", err),
        _ => err.to_string(),
    };
    UnityError::Spawn {
        name: name.to_string(),
        reason,
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(err: &std::io::Error) -> bool {
    use nix::errno::Errno;
    matches!(
        err.raw_os_error(),
        Some(code) if code == Errno::EAGAIN as i32 || code == Errno::ENOMEM as i32
    ) || err.kind() == std::io::ErrorKind::OutOfMemory
}

#[cfg(not(unix))]
fn is_resource_exhaustion(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::OutOfMemory
}
