//! Errors raised while launching workers and dispatching requests.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use querypool_config::{ConfigError, TelemetryError};
use querypool_protocol::CodecError;

use crate::pool::HandleId;

/// Failure to bring one worker process into the pool.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// The worker executable could not be spawned.
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        /// Executable that failed to start.
        program: Utf8PathBuf,
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A standard stream was not captured after spawning.
    #[error("worker {process_id} is missing its {stream} pipe")]
    MissingPipe {
        /// Process id of the spawned worker.
        process_id: u32,
        /// Name of the absent stream.
        stream: &'static str,
    },
    /// The bootstrap frame could not be written to the worker.
    #[error("failed to send bootstrap to worker {process_id}: {source}")]
    Bootstrap {
        /// Process id of the worker.
        process_id: u32,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A stream pump thread could not be started.
    #[error("failed to start stream pump for worker {process_id}: {source}")]
    Pump {
        /// Process id of the worker.
        process_id: u32,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Failure to hand a request to a worker.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Every worker has been lost or shut down.
    #[error("no workers are available")]
    EmptyPool,
    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] CodecError),
    /// The selected worker's input stream rejected the frame.
    #[error("failed to write request to worker {handle_id} (pid {process_id}): {source}")]
    Write {
        /// Pool handle of the worker.
        handle_id: HandleId,
        /// Process id of the worker.
        process_id: u32,
        /// Underlying IO error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Failure to start or run the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Telemetry could not be installed.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// The bootstrap frame could not be encoded.
    #[error("failed to encode bootstrap: {0}")]
    Bootstrap(#[source] CodecError),
    /// Not a single worker could be started.
    #[error("none of the {attempted} workers started")]
    NoWorkers {
        /// Number of launch attempts.
        attempted: usize,
        /// The last launch failure, if any attempt was made.
        #[source]
        last: Option<LaunchError>,
    },
    /// Installing the signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] Arc<io::Error>),
    /// Reading requests or writing responses failed.
    #[error("batch stream failed: {0}")]
    Stream(#[source] Arc<io::Error>),
}
