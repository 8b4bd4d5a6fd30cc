//! Structured reporting for pool lifecycle events.

use std::sync::Arc;

use crate::error::LaunchError;
use crate::pool::HandleId;
use crate::shutdown::ShutdownReport;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface pool lifecycle events to telemetry sinks.
pub trait PoolReporter: Send + Sync {
    /// Invoked before the first worker is launched.
    fn pool_starting(&self, worker_count: usize);

    /// Invoked after a worker received its bootstrap and joined the pool.
    fn worker_launched(&self, handle: HandleId, process_id: u32);

    /// Invoked when the worker at `index` could not be started.
    fn worker_failed(&self, index: usize, error: &LaunchError);

    /// Invoked once startup has finished.
    fn pool_ready(&self, started: usize, requested: usize);

    /// Invoked when a worker's response stream closes outside shutdown.
    fn worker_lost(&self, handle: HandleId, process_id: u32);

    /// Invoked after shutdown escalation completes.
    fn shutdown_complete(&self, report: &ShutdownReport);
}

impl<T> PoolReporter for Arc<T>
where
    T: PoolReporter,
{
    fn pool_starting(&self, worker_count: usize) {
        (**self).pool_starting(worker_count);
    }

    fn worker_launched(&self, handle: HandleId, process_id: u32) {
        (**self).worker_launched(handle, process_id);
    }

    fn worker_failed(&self, index: usize, error: &LaunchError) {
        (**self).worker_failed(index, error);
    }

    fn pool_ready(&self, started: usize, requested: usize) {
        (**self).pool_ready(started, requested);
    }

    fn worker_lost(&self, handle: HandleId, process_id: u32) {
        (**self).worker_lost(handle, process_id);
    }

    fn shutdown_complete(&self, report: &ShutdownReport) {
        (**self).shutdown_complete(report);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredPoolReporter;

impl StructuredPoolReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PoolReporter for StructuredPoolReporter {
    fn pool_starting(&self, worker_count: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "pool_starting",
            worker_count,
            "starting worker pool"
        );
    }

    fn worker_launched(&self, handle: HandleId, process_id: u32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "worker_launched",
            handle = %handle,
            pid = process_id,
            "worker joined the pool"
        );
    }

    fn worker_failed(&self, index: usize, error: &LaunchError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "worker_failed",
            index,
            error = %error,
            "worker failed to start"
        );
    }

    fn pool_ready(&self, started: usize, requested: usize) {
        if started < requested {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "pool_degraded",
                started,
                requested,
                "worker pool started below capacity"
            );
        } else {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "pool_ready",
                started,
                "worker pool ready"
            );
        }
    }

    fn worker_lost(&self, handle: HandleId, process_id: u32) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "worker_lost",
            handle = %handle,
            pid = process_id,
            "worker exited; its capacity will not be replaced"
        );
    }

    fn shutdown_complete(&self, report: &ShutdownReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_complete",
            graceful = report.graceful(),
            killed = report.killed(),
            "worker pool shut down"
        );
    }
}
