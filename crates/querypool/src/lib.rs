//! Parent side of the query pool.
//!
//! The [`Orchestrator`] starts a fixed batch of worker processes, hands each
//! request to the next worker in strict rotation and routes every response
//! frame to the handler registered for its route. Each request produces its
//! rows in cursor order followed by exactly one EOF frame; requests for
//! unknown queries, or whose execution fails, produce nothing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use querypool::{
//!     Orchestrator, PoolSettings, ProcessLauncher, RouteTable, StructuredPoolReporter,
//! };
//! use querypool_config::LogSettings;
//! use querypool_protocol::{ConnectionDescriptor, QueryCatalog, WorkerBootstrap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bootstrap = WorkerBootstrap::new(
//!     ConnectionDescriptor::new("app.sqlite"),
//!     QueryCatalog::new().with_query("select_one", "select 1"),
//! );
//! let launcher = ProcessLauncher::new("querypool-worker".into(), LogSettings::default());
//! let routes = RouteTable::new().with_route("inbox", |payload, _| println!("{payload:?}"));
//!
//! let mut pool = Orchestrator::start(
//!     &PoolSettings::new(3, bootstrap),
//!     &launcher,
//!     routes,
//!     Arc::new(StructuredPoolReporter::new()),
//! )?;
//! pool.query("select_one", "inbox", Vec::new())?;
//! pool.pump_until(Duration::from_secs(1), |pool| pool.outstanding() == 0);
//! let report = pool.shutdown();
//! assert_eq!(report.killed(), 0);
//! # Ok(())
//! # }
//! ```

mod error;
mod health;
mod orchestrator;
mod pool;
mod process;
mod routes;
mod settings;
mod shutdown;

pub use error::{DispatchError, LaunchError, OrchestratorError};
pub use health::{PoolReporter, StructuredPoolReporter};
pub use orchestrator::{Dispatched, Orchestrator};
pub use pool::{HandleId, PoolMember, WorkerPool};
pub use process::{
    LaunchedWorker, ProcessControl, ProcessLauncher, StopSignal, WorkerHandle, WorkerLauncher,
};
pub use routes::{RouteHandler, RouteTable};
pub use settings::{PoolSettings, resolve_worker_program};
pub use shutdown::{ShutdownReport, escalate};

#[cfg(test)]
mod tests;
