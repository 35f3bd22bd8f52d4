use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use unity_types::{DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_STARTUP_TIMEOUT_SECS};

/// How readiness of a freshly spawned process is established.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeDescriptor {
    Http { url: String, marker: Option<String> },
    Tcp { addr: String },
    Liveness { settle: Duration },
    None,
}

impl ProbeDescriptor {
    pub fn http(url: impl Into<String>) -> Self {
        ProbeDescriptor::Http { url: url.into(), marker: None }
    }

    /// Http and Tcp probes can be re-run by the monitor after startup.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, ProbeDescriptor::Http { .. } | ProbeDescriptor::Tcp { .. })
    }
}

impl fmt::Display for ProbeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeDescriptor::Http { url, marker: Some(m) } => write!(f, "http {} (marker '{}')", url, m),
            ProbeDescriptor::Http { url, marker: None } => write!(f, "http {}", url),
            ProbeDescriptor::Tcp { addr } => write!(f, "tcp {}", addr),
            ProbeDescriptor::Liveness { settle } => write!(f, "alive for {:?}", settle),
            ProbeDescriptor::None => write!(f, "none"),
        }
    }
}

/// Launch description of one managed process. Built once, then shared read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    probe: ProbeDescriptor,
    startup_timeout: Duration,
    shutdown_grace: Duration,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            probe: ProbeDescriptor::None,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_probe(mut self, probe: ProbeDescriptor) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn probe(&self) -> &ProbeDescriptor {
        &self.probe
    }

    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}
