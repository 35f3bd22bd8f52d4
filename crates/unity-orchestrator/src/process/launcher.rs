use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use unity_types::{ExitOutcome, UnityResult};

use super::handle::{HandleStatus, ProcessHandle};
use super::spec::ProcessSpec;

/// A running managed process as seen by the supervisor.
#[async_trait]
pub trait Sidecar: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn signal_stop(&self) -> UnityResult<()>;

    async fn wait(&self, grace: Duration) -> ExitOutcome;

    /// Resolves once the process has exited, however long that takes.
    async fn exited(&self) -> ExitOutcome;

    fn exit_status(&self) -> HandleStatus;
}

pub trait Launcher: Send + Sync {
    fn launch(&self, spec: Arc<ProcessSpec>) -> UnityResult<Arc<dyn Sidecar>>;
}

/// Spawns real OS processes through `ProcessHandle`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsLauncher;

impl Launcher for OsLauncher {
    fn launch(&self, spec: Arc<ProcessSpec>) -> UnityResult<Arc<dyn Sidecar>> {
        let mut handle = ProcessHandle::new(spec);
        handle.start()?;
        Ok(Arc::new(handle))
    }
}
