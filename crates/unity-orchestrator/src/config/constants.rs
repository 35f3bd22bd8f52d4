pub const DEFAULT_BACKEND_HEALTH_URL: &str = "http://127.0.0.1:8000/health";

pub const DEFAULT_LOCAL_HEALTH_URL: &str = "http://127.0.0.1:11434/api/tags";

pub const DEFAULT_LOCAL_HEALTH_MARKER: &str = "models";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;

pub const DEFAULT_PROBE_ATTEMPT_TIMEOUT_MS: u64 = 1000;

pub const DEFAULT_RESTART_BACKOFF_BASE_MS: u64 = 500;

pub const DEFAULT_RESTART_BACKOFF_MAX_MS: u64 = 10_000;

pub const DEFAULT_HEARTBEAT_SETTLE_SECS: u64 = 2;

pub const DEFAULT_DEPENDENCY_ID: &str = "remote-llm";

pub const DEFAULT_MIN_AVAILABLE_RAM_GB: f64 = 2.0;

pub const DEFAULT_MIN_FREE_DISK_GB: f64 = 5.0;

pub const DEFAULT_PREFLIGHT_HTTP_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_REQUIRED_MODELS: &[&str] = &["deepseek-r1:14b", "qwen2.5-coder:7b"];
