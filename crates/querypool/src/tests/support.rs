//! Launchers and reporters used by the orchestrator tests.
//!
//! [`InThreadLauncher`] runs the real worker loop on a thread wired up with
//! OS pipes, so the orchestrator exercises the same framing, pumping and
//! shutdown paths it uses with child processes.

use std::io::{self, BufReader, PipeWriter, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use querypool_protocol::{ConnectionDescriptor, QueryCatalog, WorkerBootstrap};
use querypool_worker::{Connector, DatabaseError, SqliteDatabase, run_worker};

use crate::error::LaunchError;
use crate::health::PoolReporter;
use crate::pool::HandleId;
use crate::process::{LaunchedWorker, ProcessControl, StopSignal, WorkerLauncher};
use crate::shutdown::ShutdownReport;

pub(crate) const SEEDED_NAMES: [&str; 3] = ["ada", "bob", "cy"];

const SCHEMA: &str = "create table t (id integer primary key, name text);
     insert into t values (1, 'ada');
     insert into t values (2, 'bob');
     insert into t values (3, 'cy');";

const FIRST_PROCESS_ID: u32 = 10_000;

/// Catalogue every test worker is bootstrapped with.
pub(crate) fn test_bootstrap() -> WorkerBootstrap {
    WorkerBootstrap::new(
        ConnectionDescriptor::new(":memory:"),
        QueryCatalog::new()
            .with_query("select_one", "select 1")
            .with_query("names", "select name from t order by id")
            .with_query("delete_by_id", "delete from t where id = ?"),
    )
}

/// Opens a private in-memory database seeded with table `t`.
struct SeededConnector;

impl Connector for SeededConnector {
    type Database = SqliteDatabase;

    fn connect(
        &self,
        _descriptor: &ConnectionDescriptor,
        statements: usize,
    ) -> Result<SqliteDatabase, DatabaseError> {
        let database = SqliteDatabase::open(":memory:", statements)?;
        database.execute_batch(SCHEMA)?;
        Ok(database)
    }
}

fn process_id(index: usize) -> u32 {
    FIRST_PROCESS_ID + u32::try_from(index).expect("small worker index")
}

fn refused(index: usize) -> LaunchError {
    LaunchError::Spawn {
        program: format!("in-thread-worker-{index}").into(),
        source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
    }
}

/// Runs each worker on its own thread behind a pair of pipes.
#[derive(Debug, Default)]
pub(crate) struct InThreadLauncher {
    refused_index: Option<usize>,
}

impl InThreadLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes the launch at `index` fail.
    pub(crate) fn refusing_index(mut self, index: usize) -> Self {
        self.refused_index = Some(index);
        self
    }
}

impl WorkerLauncher for InThreadLauncher {
    fn launch(&self, index: usize) -> Result<LaunchedWorker, LaunchError> {
        if self.refused_index == Some(index) {
            return Err(refused(index));
        }
        let (request_reader, request_writer) = io::pipe().expect("request pipe");
        let (response_reader, response_writer) = io::pipe().expect("response pipe");
        let worker = thread::Builder::new()
            .name(format!("test-worker-{index}"))
            .spawn(move || {
                let mut input = BufReader::new(request_reader);
                if let Err(error) = run_worker(&mut input, response_writer, &SeededConnector) {
                    tracing::warn!(%error, "test worker failed");
                }
            })
            .expect("spawn worker thread");

        Ok(LaunchedWorker {
            process_id: process_id(index),
            input: Box::new(request_writer),
            output: Box::new(response_reader),
            errors: None,
            process: Box::new(ThreadProcess {
                worker: Some(worker),
            }),
        })
    }
}

/// Process control for a worker thread; signals are ignored because the
/// thread stops when its input closes.
struct ThreadProcess {
    worker: Option<JoinHandle<()>>,
}

impl ProcessControl for ThreadProcess {
    fn signal(&mut self, _signal: StopSignal) -> io::Result<()> {
        Ok(())
    }

    fn try_reap(&mut self) -> io::Result<bool> {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.reap()?;
        }
        Ok(self.worker.is_none())
    }

    fn reap(&mut self) -> io::Result<()> {
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| io::Error::other("test worker panicked"))?;
        }
        Ok(())
    }
}

/// Signals observed by [`StubbornLauncher`] workers, in delivery order.
pub(crate) type SignalLog = Arc<Mutex<Vec<(u32, StopSignal)>>>;

/// Launches workers that ignore the termination command and `SIGTERM`,
/// exiting only on `SIGKILL`.
#[derive(Debug, Default)]
pub(crate) struct StubbornLauncher {
    signals: SignalLog,
    closed_output: bool,
}

impl StubbornLauncher {
    /// Workers whose response stream is already closed while the process
    /// keeps running.
    pub(crate) fn with_closed_output() -> Self {
        Self {
            closed_output: true,
            ..Self::default()
        }
    }

    pub(crate) fn signals(&self) -> SignalLog {
        Arc::clone(&self.signals)
    }
}

impl WorkerLauncher for StubbornLauncher {
    fn launch(&self, index: usize) -> Result<LaunchedWorker, LaunchError> {
        let (response_reader, response_writer) = io::pipe().expect("response pipe");
        let output: Box<dyn Read + Send> = if self.closed_output {
            Box::new(io::empty())
        } else {
            Box::new(response_reader)
        };
        Ok(LaunchedWorker {
            process_id: process_id(index),
            input: Box::new(io::sink()),
            output,
            errors: None,
            process: Box::new(StubbornProcess {
                process_id: process_id(index),
                output: Some(response_writer),
                signals: Arc::clone(&self.signals),
            }),
        })
    }
}

struct StubbornProcess {
    process_id: u32,
    output: Option<PipeWriter>,
    signals: SignalLog,
}

impl ProcessControl for StubbornProcess {
    fn signal(&mut self, signal: StopSignal) -> io::Result<()> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.process_id, signal));
        if signal == StopSignal::Kill {
            self.output = None;
        }
        Ok(())
    }

    fn try_reap(&mut self) -> io::Result<bool> {
        Ok(self.output.is_none())
    }

    fn reap(&mut self) -> io::Result<()> {
        if self.output.is_some() {
            return Err(io::Error::other("reaped a live stubborn worker"));
        }
        Ok(())
    }
}

/// Always fails to launch.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct RefusingLauncher;

impl WorkerLauncher for RefusingLauncher {
    fn launch(&self, index: usize) -> Result<LaunchedWorker, LaunchError> {
        Err(refused(index))
    }
}

/// Reporter that records lifecycle events by name.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingReporter {
    fn record(&self, event: &'static str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|recorded| **recorded == event)
            .count()
    }

    pub(crate) fn failures(&self) -> usize {
        self.count("worker_failed")
    }

    pub(crate) fn lost(&self) -> usize {
        self.count("worker_lost")
    }

    pub(crate) fn launched(&self) -> usize {
        self.count("worker_launched")
    }
}

impl PoolReporter for RecordingReporter {
    fn pool_starting(&self, _worker_count: usize) {
        self.record("pool_starting");
    }

    fn worker_launched(&self, _handle: HandleId, _process_id: u32) {
        self.record("worker_launched");
    }

    fn worker_failed(&self, _index: usize, _error: &LaunchError) {
        self.record("worker_failed");
    }

    fn pool_ready(&self, _started: usize, _requested: usize) {
        self.record("pool_ready");
    }

    fn worker_lost(&self, _handle: HandleId, _process_id: u32) {
        self.record("worker_lost");
    }

    fn shutdown_complete(&self, _report: &ShutdownReport) {
        self.record("shutdown_complete");
    }
}
