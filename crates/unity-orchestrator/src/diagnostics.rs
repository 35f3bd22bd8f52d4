use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::debug;
use unity_types::{ProcessState, StageDetail, SupervisorSnapshot, SupervisorStatus};

use crate::config::{OrchestratorConfig, PreflightConfig};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiagnosticsStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for DiagnosticsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticsStatus::Ok => write!(f, "OK"),
            DiagnosticsStatus::Warning => write!(f, "WARNING"),
            DiagnosticsStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    pub status: DiagnosticsStatus,
    pub checks: Vec<CheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl Default for DiagnosticsResult {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsResult {
    pub fn new() -> Self {
        Self {
            status: DiagnosticsStatus::Ok,
            checks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn add(&mut self, check: CheckResult) {
        if !check.passed {
            let status = match check.severity {
                Severity::Error => DiagnosticsStatus::Error,
                Severity::Warning => DiagnosticsStatus::Warning,
                Severity::Info => DiagnosticsStatus::Ok,
            };
            self.status = worse(self.status, status);
        }
        self.checks.push(check);
    }

    pub fn merge(&mut self, other: DiagnosticsResult) {
        for check in other.checks {
            self.add(check);
        }
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn warnings(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Warning)
            .count()
    }

    pub fn failures(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == Severity::Error)
            .count()
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

fn worse(a: DiagnosticsStatus, b: DiagnosticsStatus) -> DiagnosticsStatus {
    use DiagnosticsStatus::*;
    match (a, b) {
        (Error, _) | (_, Error) => Error,
        (Warning, _) | (_, Warning) => Warning,
        _ => Ok,
    }
}

/// Diagnostics derived from a supervisor snapshot. Never touches a process.
pub fn from_snapshot(snapshot: &SupervisorSnapshot, fatal: Option<&str>) -> DiagnosticsResult {
    let mut result = DiagnosticsResult::new();

    for detail in &snapshot.details {
        result.add(stage_check(detail));
    }

    let overall = format!("supervisor {}", snapshot.overall);
    result.add(match snapshot.overall {
        SupervisorStatus::Running => CheckResult::pass("supervisor", overall),
        _ => CheckResult::warn("supervisor", overall),
    });

    result.add(CheckResult::pass(
        "failover",
        if snapshot.local_primary {
            "local inference is primary"
        } else {
            "remote dependency is primary"
        },
    ));

    result.add(match fatal {
        Some(reason) => CheckResult::fail("fatal", reason),
        None => CheckResult::pass("fatal", "no fatal condition recorded"),
    });

    result
}

fn stage_check(detail: &StageDetail) -> CheckResult {
    let name = detail.stage.as_str();
    let mut message = match (&detail.state, detail.pid) {
        (ProcessState::Ready, Some(pid)) => format!("ready (pid {})", pid),
        (state, _) => state.to_string(),
    };
    if detail.forced_kill {
        message.push_str(", last stop was a forced kill");
    }
    if detail.restarts > 0 {
        message.push_str(&format!(", {} restart(s)", detail.restarts));
    }

    match &detail.state {
        ProcessState::Ready => CheckResult::pass(name, message),
        ProcessState::Failed { .. } if detail.mandatory => CheckResult::fail(name, message),
        _ if !detail.mandatory => CheckResult::pass(name, format!("{} (standby)", message)),
        _ => CheckResult::warn(name, message),
    }
}

/// Host and endpoint checks run before the stages are started.
pub async fn preflight(config: &OrchestratorConfig, local_primary: bool) -> DiagnosticsResult {
    let http_timeout = Duration::from_secs(config.preflight.http_timeout_secs.max(1));
    let backend_url = config.backend.probe.http_url().map(String::from);
    let local_url = config.local_inference.probe.http_url().map(String::from);

    let thresholds = config.preflight.clone();
    let data_dir = config.data_dir.clone();
    let resources = tokio::task::spawn_blocking(move || resource_checks(&thresholds, &data_dir));

    let required = config.preflight.required_models.clone();
    let (resources, backend, local, models) = tokio::join!(
        resources,
        endpoint_reachable(backend_url, http_timeout),
        endpoint_reachable(local_url.clone(), http_timeout),
        model_check(local_url, required, http_timeout, local_primary),
    );

    let mut result = DiagnosticsResult::new();
    match resources {
        Ok(checks) => checks.into_iter().for_each(|c| result.add(c)),
        Err(e) => result.add(CheckResult::warn("resources", format!("check failed: {}", e))),
    }

    result.add(match backend {
        Reachability::Up(url) => CheckResult::pass("backend endpoint", format!("{} answering", url)),
        Reachability::Down(url, reason) => CheckResult::warn(
            "backend endpoint",
            format!("{} not answering yet ({}), it will be started", url, reason),
        ),
        Reachability::Unprobed => CheckResult::pass("backend endpoint", "no HTTP probe configured"),
    });

    result.add(match local {
        Reachability::Up(url) => CheckResult::pass("local runtime", format!("{} answering", url)),
        Reachability::Down(url, reason) if local_primary => CheckResult::fail(
            "local runtime",
            format!("{} unreachable while designated primary ({})", url, reason),
        ),
        Reachability::Down(url, reason) => {
            CheckResult::warn("local runtime", format!("{} unreachable ({})", url, reason))
        }
        Reachability::Unprobed => CheckResult::pass("local runtime", "no HTTP probe configured"),
    });
    result.add(models);

    result
}

/// Checks that every required model shows up in the local runtime's model list.
async fn model_check(
    url: Option<String>,
    required: Vec<String>,
    timeout: Duration,
    local_primary: bool,
) -> CheckResult {
    if required.is_empty() {
        return CheckResult::pass("models", "no models required");
    }
    let Some(url) = url else {
        return CheckResult::pass("models", "no HTTP probe configured for the local runtime");
    };

    let problem = |message: String| {
        if local_primary {
            CheckResult::fail("models", message)
        } else {
            CheckResult::warn("models", message)
        }
    };

    let installed = match installed_models(&url, timeout).await {
        Ok(installed) => installed,
        Err(reason) => return problem(format!("cannot list models at {} ({})", url, reason)),
    };

    let missing: Vec<_> = required
        .iter()
        .filter(|name| !installed.iter().any(|m| m.contains(name.as_str())))
        .cloned()
        .collect();

    if missing.is_empty() {
        CheckResult::pass("models", format!("all required models present: {}", required.join(", ")))
    } else {
        problem(format!("missing models: {}", missing.join(", ")))
    }
}

async fn installed_models(url: &str, timeout: Duration) -> Result<Vec<String>, String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())?;

    let resp = client.get(url).send().await.map_err(|e| {
        debug!("Model list request to {} failed: {}", url, e);
        "no response".to_string()
    })?;
    if !resp.status().is_success() {
        return Err(resp.status().to_string());
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|_| "malformed model list".to_string())?;
    let models = body
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| "no 'models' array".to_string())?;

    Ok(models
        .iter()
        .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
        .map(String::from)
        .collect())
}

enum Reachability {
    Up(String),
    Down(String, String),
    Unprobed,
}

async fn endpoint_reachable(url: Option<String>, timeout: Duration) -> Reachability {
    let Some(url) = url else {
        return Reachability::Unprobed;
    };

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return Reachability::Down(url, e.to_string()),
    };

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Reachability::Up(url),
        Ok(resp) => {
            let status = resp.status().to_string();
            Reachability::Down(url, status)
        }
        Err(e) => {
            debug!("Preflight request to {} failed: {}", url, e);
            Reachability::Down(url, "no response".into())
        }
    }
}

fn resource_checks(thresholds: &PreflightConfig, data_dir: &Path) -> Vec<CheckResult> {
    let mut system = System::new();
    system.refresh_memory();
    let available_gb = system.available_memory() as f64 / GB;
    let memory = if available_gb >= thresholds.min_available_ram_gb {
        CheckResult::pass("memory", format!("{:.1}GB available", available_gb))
    } else {
        CheckResult::warn(
            "memory",
            format!(
                "{:.1}GB available, {:.1}GB recommended for local inference",
                available_gb, thresholds.min_available_ram_gb
            ),
        )
    };

    let disk = match free_disk_gb(data_dir) {
        Some(free_gb) if free_gb >= thresholds.min_free_disk_gb => {
            CheckResult::pass("disk", format!("{:.1}GB free", free_gb))
        }
        Some(free_gb) => CheckResult::warn(
            "disk",
            format!(
                "{:.1}GB free, {:.1}GB recommended",
                free_gb, thresholds.min_free_disk_gb
            ),
        ),
        None => CheckResult::warn("disk", "could not determine free space"),
    };

    vec![memory, disk]
}

/// Free space on the disk holding `path`, picked by longest mount point prefix.
fn free_disk_gb(path: &Path) -> Option<f64> {
    let target = existing_ancestor(path);
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space() as f64 / GB)
}

fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}
