//! Shutdown escalation for a drained pool.
//!
//! Every handle in the snapshot is asked to stop three ways in turn: the
//! termination command frame with its input closed, then `SIGTERM`, then
//! (after the grace period) `SIGKILL` for whoever is still running.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use querypool_protocol::{QueryRequest, encode_frame};

use crate::pool::PoolMember;
use crate::process::{StopSignal, WorkerHandle};

const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of [`escalate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    graceful: usize,
    killed: usize,
}

impl ShutdownReport {
    /// Workers that exited within the grace period.
    #[must_use]
    pub const fn graceful(&self) -> usize {
        self.graceful
    }

    /// Workers that had to be killed.
    #[must_use]
    pub const fn killed(&self) -> usize {
        self.killed
    }
}

/// Stops every handle in `handles`, escalating to `SIGKILL` after `grace`.
///
/// A handle whose status cannot be queried is treated as still running and
/// is killed once the grace period ends.
#[must_use]
pub fn escalate(handles: Vec<WorkerHandle>, grace: Duration) -> ShutdownReport {
    let mut report = ShutdownReport::default();
    if handles.is_empty() {
        return report;
    }
    info!(
        target: SHUTDOWN_TARGET,
        workers = handles.len(),
        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        "shutting down workers"
    );

    let mut survivors = handles;
    request_termination(&mut survivors);

    let deadline = Instant::now() + grace;
    loop {
        survivors.retain_mut(|handle| !collect_exit(handle, &mut report));
        let remaining = deadline.saturating_duration_since(Instant::now());
        if survivors.is_empty() || remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }

    for mut handle in survivors {
        warn!(
            target: SHUTDOWN_TARGET,
            handle = %handle.handle_id(),
            pid = handle.process_id(),
            "worker outlived the grace period; killing"
        );
        if let Err(error) = handle.signal(StopSignal::Kill) {
            warn!(
                target: SHUTDOWN_TARGET,
                pid = handle.process_id(),
                error = %error,
                "failed to kill worker"
            );
        }
        match handle.reap() {
            Ok(()) => report.killed += 1,
            Err(error) => warn!(
                target: SHUTDOWN_TARGET,
                pid = handle.process_id(),
                error = %error,
                "failed to reap killed worker"
            ),
        }
    }
    report
}

fn request_termination(handles: &mut [WorkerHandle]) {
    let command = encode_frame(&QueryRequest::terminate())
        .inspect_err(|error| {
            warn!(
                target: SHUTDOWN_TARGET,
                error = %error,
                "failed to encode termination command"
            );
        })
        .ok();

    for handle in handles.iter_mut() {
        let delivery = command.as_deref().map(|frame| handle.send(frame));
        if let Some(Err(error)) = delivery {
            debug!(
                target: SHUTDOWN_TARGET,
                pid = handle.process_id(),
                error = %error,
                "termination command not delivered"
            );
        }
        handle.close_input();
    }

    for handle in handles.iter_mut() {
        if let Err(error) = handle.signal(StopSignal::Terminate) {
            debug!(
                target: SHUTDOWN_TARGET,
                pid = handle.process_id(),
                error = %error,
                "failed to send SIGTERM"
            );
        }
    }
}

/// Returns `true` once `handle` has exited and been reaped.
fn collect_exit(handle: &mut WorkerHandle, report: &mut ShutdownReport) -> bool {
    match handle.try_reap() {
        Ok(true) => {
            report.graceful += 1;
            true
        }
        Ok(false) => false,
        Err(error) => {
            debug!(
                target: SHUTDOWN_TARGET,
                pid = handle.process_id(),
                error = %error,
                "worker status unknown; treating it as running"
            );
            false
        }
    }
}
