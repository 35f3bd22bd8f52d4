use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as GateMutex;
use tracing::{debug, info, warn};
use unity_types::{FocusOutcome, UnityError, UnityResult, WindowEntry};

use super::host::WindowHost;
use super::label::label_for;

const OPEN_ATTEMPTS: u32 = 2;

/// One tracked window per task, and one task per label.
pub struct WindowRegistry {
    host: Arc<dyn WindowHost>,
    entries: Mutex<HashMap<String, WindowEntry>>,
    labels: Mutex<HashMap<String, String>>,
    gates: Mutex<HashMap<String, Arc<GateMutex<()>>>>,
}

impl WindowRegistry {
    pub fn new(host: Arc<dyn WindowHost>) -> Self {
        Self {
            host,
            entries: Mutex::new(HashMap::new()),
            labels: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, task_name: &str) -> Arc<GateMutex<()>> {
        self.gates
            .lock()
            .entry(task_name.to_string())
            .or_default()
            .clone()
    }

    fn prune_gate(&self, task_name: &str) {
        let mut gates = self.gates.lock();
        if gates.get(task_name).map_or(false, |g| Arc::strong_count(g) == 1) {
            gates.remove(task_name);
        }
    }

    fn prune_idle_gates(&self) {
        self.gates.lock().retain(|_, g| Arc::strong_count(g) > 1);
    }

    /// Reserves `label` for `task_name`. Fails if another task holds it.
    fn claim(&self, task_name: &str, label: &str) -> UnityResult<()> {
        let mut labels = self.labels.lock();
        match labels.get(label) {
            Some(holder) if holder != task_name => Err(UnityError::WindowOpen {
                task: task_name.to_string(),
                reason: format!("label '{}' is held by task '{}'", label, holder),
            }),
            _ => {
                labels.insert(label.to_string(), task_name.to_string());
                Ok(())
            }
        }
    }

    fn release(&self, task_name: &str, label: &str) {
        let mut labels = self.labels.lock();
        if labels.get(label).map_or(false, |holder| holder == task_name) {
            labels.remove(label);
        }
    }

    /// Focuses the task's window if one is tracked, otherwise opens one. Returns its label.
    pub async fn open(&self, task_name: &str) -> UnityResult<String> {
        let gate = self.gate(task_name);
        let result = {
            let _guard = gate.lock().await;
            self.focus_or_open(task_name).await
        };
        drop(gate);
        self.prune_gate(task_name);
        result
    }

    async fn focus_or_open(&self, task_name: &str) -> UnityResult<String> {
        let existing = self.entries.lock().get(task_name).cloned();
        if let Some(entry) = existing {
            match self.host.focus_window(&entry.label).await {
                FocusOutcome::Focused => {
                    debug!("Focused window '{}' for task '{}'", entry.label, task_name);
                    return Ok(entry.label);
                }
                FocusOutcome::NotFound => {
                    info!("Window '{}' is gone, reopening", entry.label);
                }
                FocusOutcome::Failed(reason) => {
                    warn!("Focus of '{}' failed ({}), reopening", entry.label, reason);
                }
            }
            self.remove_if_label(task_name, &entry.label);
        }

        let label = label_for(task_name);
        self.claim(task_name, &label)?;

        let mut last_error = None;
        for attempt in 1..=OPEN_ATTEMPTS {
            match self.host.open_window(task_name, &label).await {
                Ok(opened) => {
                    if opened != label {
                        self.release(task_name, &label);
                        self.claim(task_name, &opened)?;
                    }
                    let entry = WindowEntry {
                        label: opened.clone(),
                        task_name: task_name.to_string(),
                        opened_at: Utc::now(),
                    };
                    self.entries.lock().insert(task_name.to_string(), entry);
                    info!("Opened window '{}' for task '{}'", opened, task_name);
                    return Ok(opened);
                }
                Err(e) => {
                    warn!(
                        "Opening window for '{}' failed (attempt {}/{}): {}",
                        task_name, attempt, OPEN_ATTEMPTS, e
                    );
                    last_error = Some(e);
                }
            }
        }

        self.release(task_name, &label);
        Err(UnityError::WindowOpen {
            task: task_name.to_string(),
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Stops tracking the task's window. Unknown tasks are ignored.
    pub fn close(&self, task_name: &str) -> bool {
        let removed = self.entries.lock().remove(task_name);
        if let Some(ref entry) = removed {
            self.release(task_name, &entry.label);
            debug!("Closed window entry for task '{}'", task_name);
        }
        self.prune_gate(task_name);
        removed.is_some()
    }

    /// The host reports `label` closed.
    pub fn host_closed(&self, label: &str) -> bool {
        let Some(task_name) = self.labels.lock().get(label).cloned() else {
            return false;
        };
        let pruned = {
            let mut entries = self.entries.lock();
            if entries.get(&task_name).map_or(false, |e| e.label == label) {
                entries.remove(&task_name);
                true
            } else {
                false
            }
        };
        if pruned {
            self.release(&task_name, label);
            self.prune_gate(&task_name);
            debug!("Pruned window '{}'", label);
        }
        pruned
    }

    pub fn list_open(&self) -> Vec<WindowEntry> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.label.cmp(&b.label))
        });
        entries
    }

    pub fn close_all(&self) -> usize {
        let count = {
            let mut entries = self.entries.lock();
            let mut labels = self.labels.lock();
            for entry in entries.values() {
                if labels.get(&entry.label) == Some(&entry.task_name) {
                    labels.remove(&entry.label);
                }
            }
            let count = entries.len();
            entries.clear();
            count
        };
        self.prune_idle_gates();
        if count > 0 {
            info!("Closed {} window entries", count);
        }
        count
    }

    pub fn get(&self, task_name: &str) -> Option<WindowEntry> {
        self.entries.lock().get(task_name).cloned()
    }

    fn remove_if_label(&self, task_name: &str, label: &str) {
        let removed = {
            let mut entries = self.entries.lock();
            if entries.get(task_name).map_or(false, |e| e.label == label) {
                entries.remove(task_name);
                true
            } else {
                false
            }
        };
        if removed {
            self.release(task_name, label);
        }
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.lock().len()
    }
}
