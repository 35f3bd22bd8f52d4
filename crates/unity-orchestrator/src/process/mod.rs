mod handle;
mod launcher;
mod spec;

pub use handle::{HandleStatus, ProcessHandle};
pub use launcher::{Launcher, OsLauncher, Sidecar};
pub use spec::{ProbeDescriptor, ProcessSpec};
