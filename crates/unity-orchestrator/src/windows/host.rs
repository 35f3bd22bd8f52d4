use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::debug;
use unity_types::{FocusOutcome, UnityResult};

/// Window primitives of the hosting shell.
#[async_trait]
pub trait WindowHost: Send + Sync {
    /// Opens a window for `task` under `label` and returns the label the host used.
    async fn open_window(&self, task: &str, label: &str) -> UnityResult<String>;

    async fn focus_window(&self, label: &str) -> FocusOutcome;
}

/// Host without a display: windows are bookkeeping only.
#[derive(Default)]
pub struct HeadlessWindowHost {
    open: Mutex<BTreeSet<String>>,
}

impl HeadlessWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets `label` as if the user closed the window.
    pub fn close(&self, label: &str) -> bool {
        self.open.lock().remove(label)
    }

    pub fn open_labels(&self) -> Vec<String> {
        self.open.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl WindowHost for HeadlessWindowHost {
    async fn open_window(&self, task: &str, label: &str) -> UnityResult<String> {
        debug!("Headless window '{}' opened for task '{}'", label, task);
        self.open.lock().insert(label.to_string());
        Ok(label.to_string())
    }

    async fn focus_window(&self, label: &str) -> FocusOutcome {
        if self.open.lock().contains(label) {
            FocusOutcome::Focused
        } else {
            FocusOutcome::NotFound
        }
    }
}
