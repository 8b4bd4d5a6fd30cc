//! Runtime settings derived from the loaded configuration.

use std::env;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use querypool_config::{Config, ConfigError, WORKER_PROGRAM_NAME};
use querypool_protocol::WorkerBootstrap;

/// What the orchestrator needs to start and stop its pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    worker_count: usize,
    bootstrap: WorkerBootstrap,
    grace_period: Duration,
}

impl PoolSettings {
    /// Builds settings for `worker_count` workers sharing `bootstrap`.
    #[must_use]
    pub const fn new(worker_count: usize, bootstrap: WorkerBootstrap) -> Self {
        Self {
            worker_count,
            bootstrap,
            grace_period: Duration::from_millis(querypool_config::DEFAULT_GRACE_PERIOD_MS),
        }
    }

    /// Overrides the TERMINATE to KILL grace period.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Validates `config`, loads its query catalogue and assembles the
    /// bootstrap sent to every worker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the catalogue cannot
    /// be loaded.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let bootstrap = WorkerBootstrap::new(config.connection(), config.query_catalog()?)
            .with_dry_run(config.debug())
            .with_throttle_pause_ms(config.throttle_pause_ms());
        Ok(Self::new(config.worker_count(), bootstrap)
            .with_grace_period(Duration::from_millis(config.grace_period_ms())))
    }

    /// Number of workers to start.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Bootstrap frame shared by every worker.
    #[must_use]
    pub const fn bootstrap(&self) -> &WorkerBootstrap {
        &self.bootstrap
    }

    /// Time allowed between TERMINATE and KILL at shutdown.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

/// Resolves the worker executable.
///
/// An explicit `worker_program` wins. Otherwise the worker is expected next
/// to the running executable, falling back to a `PATH` lookup by name.
#[must_use]
pub fn resolve_worker_program(config: &Config) -> Utf8PathBuf {
    if let Some(program) = config.worker_program() {
        return program.to_path_buf();
    }
    env::current_exe()
        .ok()
        .and_then(|exe| Utf8PathBuf::from_path_buf(exe).ok())
        .and_then(|exe| exe.parent().map(|dir| dir.join(WORKER_PROGRAM_NAME)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| Utf8Path::new(WORKER_PROGRAM_NAME).to_path_buf())
}
