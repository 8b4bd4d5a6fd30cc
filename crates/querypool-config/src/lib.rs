//! Layered configuration shared by the query pool binaries.
//!
//! Values resolve from built-in defaults, then an optional configuration
//! file, then `QUERYPOOL_*` environment variables, then command-line flags.

mod defaults;
mod error;
mod logging;
mod queries;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

use querypool_protocol::{ConnectionDescriptor, QueryCatalog};

pub use defaults::{
    DEFAULT_DSN, DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_FILTER, DEFAULT_THROTTLE_PAUSE_MS,
    DEFAULT_WORKER_COUNT, WORKER_PROGRAM_NAME, default_dsn, default_grace_period_ms,
    default_log_filter, default_log_filter_string, default_log_format, default_throttle_pause_ms,
    default_worker_count,
};
pub use error::ConfigError;
pub use logging::{
    LogFormat, LogFormatParseError, LogSettings, TelemetryError, TelemetryHandle, initialise,
};
pub use queries::{load_catalogue, parse_catalogue};

/// Resolved configuration for the orchestrator.
#[derive(Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "QUERYPOOL")]
pub struct Config {
    /// Database address handed to every worker.
    #[serde(default = "default_dsn")]
    pub dsn: String,
    /// Optional database user.
    #[serde(default)]
    pub db_user: Option<String>,
    /// Optional database password.
    #[serde(default)]
    pub db_password: Option<String>,
    /// TOML file holding the `[queries]` table.
    #[serde(default)]
    pub queries_path: Option<Utf8PathBuf>,
    /// Workers spawned at startup.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Worker executable; defaults to `querypool-worker` next to the
    /// running binary.
    #[serde(default)]
    pub worker_program: Option<Utf8PathBuf>,
    /// Dry-run mode: workers log substituted SQL instead of touching the
    /// database.
    #[serde(default)]
    pub debug: bool,
    /// Milliseconds between TERMINATE and KILL at shutdown.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Milliseconds paused between rows of throttled requests.
    #[serde(default = "default_throttle_pause_ms")]
    pub throttle_pause_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dsn: default_dsn(),
            db_user: None,
            db_password: None,
            queries_path: None,
            worker_count: default_worker_count(),
            worker_program: None,
            debug: false,
            grace_period_ms: default_grace_period_ms(),
            throttle_pause_ms: default_throttle_pause_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Config")
            .field("dsn", &self.dsn)
            .field("db_user", &self.db_user)
            .field(
                "db_password",
                &self.db_password.as_ref().map(|_| "<redacted>"),
            )
            .field("queries_path", &self.queries_path)
            .field("worker_count", &self.worker_count)
            .field("worker_program", &self.worker_program)
            .field("debug", &self.debug)
            .field("grace_period_ms", &self.grace_period_ms)
            .field("throttle_pause_ms", &self.throttle_pause_ms)
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the loader's aggregated error when any layer is invalid.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// Returns the loader's aggregated error when any layer is invalid.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Checks invariants the loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoWorkers`] when `worker_count` is zero.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Returns the database address.
    #[must_use]
    pub const fn dsn(&self) -> &str {
        self.dsn.as_str()
    }

    /// Builds the connection descriptor sent to workers.
    #[must_use]
    pub fn connection(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.dsn.clone())
            .with_credentials(self.db_user.clone(), self.db_password.clone())
    }

    /// Returns the catalogue file path, if configured.
    #[must_use]
    pub fn queries_path(&self) -> Option<&Utf8Path> {
        self.queries_path.as_deref()
    }

    /// Loads the query catalogue. No configured path means an empty
    /// catalogue.
    ///
    /// # Errors
    ///
    /// Returns any [`ConfigError`] raised by [`load_catalogue`].
    pub fn query_catalog(&self) -> Result<QueryCatalog, ConfigError> {
        self.queries_path()
            .map_or_else(|| Ok(QueryCatalog::new()), load_catalogue)
    }

    /// Returns the number of workers to spawn.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the configured worker executable, if any.
    #[must_use]
    pub fn worker_program(&self) -> Option<&Utf8Path> {
        self.worker_program.as_deref()
    }

    /// Returns whether dry-run mode is enabled.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the shutdown grace period in milliseconds.
    #[must_use]
    pub const fn grace_period_ms(&self) -> u64 {
        self.grace_period_ms
    }

    /// Returns the throttle pause in milliseconds.
    #[must_use]
    pub const fn throttle_pause_ms(&self) -> u64 {
        self.throttle_pause_ms
    }

    /// Returns the log filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the logging settings for this process and its workers.
    #[must_use]
    pub fn log_settings(&self) -> LogSettings {
        LogSettings::new(self.log_filter.clone(), self.log_format)
    }
}
