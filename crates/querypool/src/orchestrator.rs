//! The orchestrator: owns the pool, submits requests and routes responses.
//!
//! All pool mutation, decoding and handler invocation happens on the thread
//! that owns the [`Orchestrator`]. Pump threads only forward raw bytes from
//! each worker's response stream over a channel, so a quiet worker never
//! blocks a busy one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use querypool_protocol::{FrameDecoder, QueryRequest, ResponseFrame, Value, encode_frame};

use crate::error::{DispatchError, LaunchError, OrchestratorError};
use crate::health::PoolReporter;
use crate::pool::{HandleId, PoolMember, WorkerPool};
use crate::process::{
    LaunchedWorker, StopSignal, WorkerEvent, WorkerHandle, WorkerLauncher, spawn_error_pump,
    spawn_output_pump,
};
use crate::routes::RouteTable;
use crate::settings::PoolSettings;
use crate::shutdown::{ShutdownReport, escalate};

const ORCHESTRATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::orchestrator");

/// Receipt for a request handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    handle_id: HandleId,
    process_id: u32,
}

impl Dispatched {
    /// Pool handle of the chosen worker.
    #[must_use]
    pub const fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// Process id of the chosen worker.
    #[must_use]
    pub const fn process_id(&self) -> u32 {
        self.process_id
    }
}

/// Per-worker stream state held on the control thread.
#[derive(Debug, Default)]
struct StreamState {
    decoder: FrameDecoder,
    outstanding: usize,
}

/// Parent-side coordinator of a pool of query workers.
pub struct Orchestrator {
    pool: WorkerPool<WorkerHandle>,
    routes: RouteTable,
    streams: HashMap<HandleId, StreamState>,
    stranded: usize,
    retired: Vec<WorkerHandle>,
    events: Receiver<WorkerEvent>,
    grace_period: Duration,
    reporter: Arc<dyn PoolReporter>,
}

impl Orchestrator {
    /// Launches `settings.worker_count()` workers, sends each the bootstrap
    /// frame and pools the ones that started.
    ///
    /// Individual launch failures are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Bootstrap`] if the bootstrap cannot be
    /// encoded and [`OrchestratorError::NoWorkers`] if no worker started.
    pub fn start<L>(
        settings: &PoolSettings,
        launcher: &L,
        routes: RouteTable,
        reporter: Arc<dyn PoolReporter>,
    ) -> Result<Self, OrchestratorError>
    where
        L: WorkerLauncher + ?Sized,
    {
        let requested = settings.worker_count();
        reporter.pool_starting(requested);
        let bootstrap = encode_frame(settings.bootstrap()).map_err(OrchestratorError::Bootstrap)?;

        let (sender, events) = mpsc::channel();
        let mut orchestrator = Self {
            pool: WorkerPool::new(),
            routes,
            streams: HashMap::new(),
            stranded: 0,
            retired: Vec::new(),
            events,
            grace_period: settings.grace_period(),
            reporter,
        };

        let mut last_failure = None;
        for index in 0..requested {
            let attached = launcher
                .launch(index)
                .and_then(|launched| attach(HandleId::new(index), launched, &bootstrap, &sender));
            match attached {
                Ok(handle) => orchestrator.admit(handle),
                Err(error) => {
                    orchestrator.reporter.worker_failed(index, &error);
                    last_failure = Some(error);
                }
            }
        }

        let started = orchestrator.pool.len();
        orchestrator.reporter.pool_ready(started, requested);
        if started == 0 {
            return Err(OrchestratorError::NoWorkers {
                attempted: requested,
                last: last_failure,
            });
        }
        Ok(orchestrator)
    }

    fn admit(&mut self, handle: WorkerHandle) {
        let (handle_id, process_id) = (handle.handle_id(), handle.process_id());
        match self.pool.add(handle) {
            Ok(()) => {
                self.streams.insert(handle_id, StreamState::default());
                self.reporter.worker_launched(handle_id, process_id);
            }
            Err(mut duplicate) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    handle = %handle_id,
                    pid = process_id,
                    "duplicate worker handle; killing it"
                );
                drop(duplicate.signal(StopSignal::Kill));
                drop(duplicate.reap());
            }
        }
    }

    /// Sends `query_name` with `parameters` to the next worker, asking for
    /// responses on `route`.
    ///
    /// Neither the query name nor the parameter count is checked here.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::dispatch`].
    pub fn query(
        &mut self,
        query_name: &str,
        route: &str,
        parameters: Vec<Value>,
    ) -> Result<Dispatched, DispatchError> {
        self.dispatch(&QueryRequest::new(query_name, route).with_parameters(parameters))
    }

    /// Encodes `request` and writes it to the next worker in rotation.
    ///
    /// This never waits for the database; responses arrive through
    /// [`Orchestrator::pump`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyPool`] when no worker remains,
    /// [`DispatchError::Encode`] when the request cannot be encoded and
    /// [`DispatchError::Write`] when the chosen worker's input fails.
    pub fn dispatch(&mut self, request: &QueryRequest) -> Result<Dispatched, DispatchError> {
        let frame = encode_frame(request).map_err(DispatchError::Encode)?;
        let handle = self.pool.next().ok_or(DispatchError::EmptyPool)?;
        let receipt = Dispatched {
            handle_id: handle.handle_id(),
            process_id: handle.process_id(),
        };

        if let Err(source) = handle.send(&frame) {
            warn!(
                target: ORCHESTRATOR_TARGET,
                handle = %receipt.handle_id,
                pid = receipt.process_id,
                query = request.query_name(),
                error = %source,
                "failed to write request to worker"
            );
            return Err(DispatchError::Write {
                handle_id: receipt.handle_id,
                process_id: receipt.process_id,
                source: Arc::new(source),
            });
        }

        if let Some(stream) = self.streams.get_mut(&receipt.handle_id) {
            stream.outstanding += 1;
        }
        debug!(
            target: ORCHESTRATOR_TARGET,
            handle = %receipt.handle_id,
            pid = receipt.process_id,
            query = request.query_name(),
            route = request.route(),
            "request dispatched"
        );
        Ok(receipt)
    }

    /// Waits up to `timeout` for worker output, then handles everything
    /// pending without blocking again.
    ///
    /// Returns the number of frames delivered to handlers.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let first = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return 0,
            Err(RecvTimeoutError::Disconnected) => {
                // Every pump has exited, so nothing can arrive.
                thread::sleep(timeout);
                return 0;
            }
        };
        let mut delivered = self.apply(first);
        while let Ok(event) = self.events.try_recv() {
            delivered += self.apply(event);
        }
        delivered
    }

    /// Pumps until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns the final answer of `done`.
    pub fn pump_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done(self) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.pump(remaining);
        }
    }

    fn apply(&mut self, event: WorkerEvent) -> usize {
        match event {
            WorkerEvent::Output { handle, bytes } => self.decode(handle, &bytes),
            WorkerEvent::Closed { handle } => {
                self.retire(handle);
                0
            }
        }
    }

    fn decode(&mut self, handle: HandleId, bytes: &[u8]) -> usize {
        let Some(stream) = self.streams.get_mut(&handle) else {
            debug!(
                target: ORCHESTRATOR_TARGET,
                handle = %handle,
                "output from a retired worker ignored"
            );
            return 0;
        };
        stream.decoder.extend(bytes);

        let mut frames = Vec::new();
        while let Some(decoded) = stream.decoder.next_frame::<ResponseFrame>() {
            match decoded {
                Ok(frame) => {
                    if frame.payload().is_eof() {
                        stream.outstanding = stream.outstanding.saturating_sub(1);
                    }
                    frames.push(frame);
                }
                Err(error) => warn!(
                    target: ORCHESTRATOR_TARGET,
                    handle = %handle,
                    error = %error,
                    "malformed response frame dropped"
                ),
            }
        }

        frames
            .into_iter()
            .map(|frame| usize::from(self.routes.deliver(frame)))
            .sum()
    }

    fn retire(&mut self, handle_id: HandleId) {
        if let Some(stream) = self.streams.remove(&handle_id) {
            if stream.decoder.buffered() > 0 {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    handle = %handle_id,
                    bytes = stream.decoder.buffered(),
                    "worker output ended inside a frame"
                );
            }
            self.stranded += stream.outstanding;
        }
        let Some(mut handle) = self.pool.remove_by_handle_id(handle_id) else {
            return;
        };
        self.reporter.worker_lost(handle_id, handle.process_id());
        handle.close_input();
        match handle.try_reap() {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    target: ORCHESTRATOR_TARGET,
                    handle = %handle_id,
                    pid = handle.process_id(),
                    "lost worker still running; it will be stopped at shutdown"
                );
                self.retired.push(handle);
            }
            Err(error) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    handle = %handle_id,
                    error = %error,
                    "lost worker status unknown; it will be stopped at shutdown"
                );
                self.retired.push(handle);
            }
        }
    }

    /// Requests dispatched whose EOF has not arrived. Requests that never
    /// receive an EOF stay counted.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.streams
            .values()
            .map(|stream| stream.outstanding)
            .sum::<usize>()
            + self.stranded
    }

    /// Number of pooled workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    /// Read-only view of the pool.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool<WorkerHandle> {
        &self.pool
    }

    /// Mutable access to the route table.
    pub const fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.routes
    }

    /// Drains the pool and escalates every worker to exit, including lost
    /// workers that had not exited when they were retired.
    #[must_use]
    pub fn shutdown(mut self) -> ShutdownReport {
        info!(
            target: ORCHESTRATOR_TARGET,
            workers = self.pool.len(),
            retired = self.retired.len(),
            outstanding = self.outstanding(),
            "orchestrator shutting down"
        );
        let mut snapshot = self.pool.drain();
        snapshot.append(&mut self.retired);
        let report = escalate(snapshot, self.grace_period);
        self.reporter.shutdown_complete(&report);
        report
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pool", &self.pool)
            .field("routes", &self.routes)
            .field("retired", &self.retired.len())
            .field("outstanding", &self.outstanding())
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

/// Turns a launched worker into a pooled handle: sends the bootstrap, then
/// starts the stream pumps.
fn attach(
    handle_id: HandleId,
    launched: LaunchedWorker,
    bootstrap: &[u8],
    events: &Sender<WorkerEvent>,
) -> Result<WorkerHandle, LaunchError> {
    let LaunchedWorker {
        process_id,
        input,
        output,
        errors,
        process,
    } = launched;
    let mut handle = WorkerHandle::new(handle_id, process_id, input, process);

    let started = handle
        .send(bootstrap)
        .map_err(|source| LaunchError::Bootstrap {
            process_id,
            source: Arc::new(source),
        })
        .and_then(|()| spawn_output_pump(handle_id, process_id, output, events.clone()))
        .and_then(|()| {
            errors.map_or(Ok(()), |stream| spawn_error_pump(handle_id, process_id, stream))
        });

    if let Err(error) = started {
        handle.close_input();
        drop(handle.signal(StopSignal::Kill));
        drop(handle.reap());
        return Err(error);
    }
    Ok(handle)
}
