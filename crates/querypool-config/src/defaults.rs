use crate::logging::LogFormat;

/// Database address used when none is configured: a private in-memory
/// SQLite database per worker.
pub const DEFAULT_DSN: &str = ":memory:";

/// Number of workers spawned at startup.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Grace period between the TERMINATE and KILL signals at shutdown.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;

/// Pause inserted between rows of throttled requests.
pub const DEFAULT_THROTTLE_PAUSE_MS: u64 = 5;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// File name of the worker executable looked up next to the orchestrator.
pub const WORKER_PROGRAM_NAME: &str = "querypool-worker";

/// Owned database address for serde defaults.
#[must_use]
pub fn default_dsn() -> String {
    DEFAULT_DSN.to_owned()
}

/// Default worker count.
#[must_use]
pub const fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

/// Default shutdown grace period in milliseconds.
#[must_use]
pub const fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

/// Default throttle pause in milliseconds.
#[must_use]
pub const fn default_throttle_pause_ms() -> u64 {
    DEFAULT_THROTTLE_PAUSE_MS
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
