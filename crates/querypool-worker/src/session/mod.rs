//! The worker's request loop.
//!
//! A session moves through `Starting → Ready → (Processing)* → Draining →
//! Terminated` and never restarts. Each request is finished (every row plus
//! one EOF frame) before the next frame is decoded.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use querypool_protocol::{
    CodecError, Payload, QueryRequest, ResponseFrame, WorkerBootstrap, encode_frame, read_frame,
};

use crate::catalog::{StatementCatalog, StatementSlot};
use crate::database::{Connector, Database};
use crate::error::WorkerError;
use crate::substitute::substitute;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Lifecycle position of a worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Reading the bootstrap and preparing statements.
    Starting,
    /// Waiting for the next request.
    Ready,
    /// Executing a request and streaming its response.
    Processing,
    /// Releasing the database connection.
    Draining,
    /// Finished; the process may exit.
    Terminated,
}

/// One worker's connection, statements and response stream.
#[derive(Debug)]
pub struct WorkerSession<D, W> {
    state: WorkerState,
    statements: StatementCatalog,
    database: Option<D>,
    output: W,
    throttle_pause: Duration,
}

impl<D, W> WorkerSession<D, W>
where
    D: Database,
    W: Write,
{
    /// Applies a bootstrap frame.
    ///
    /// Outside dry-run mode this opens one connection through `connector` and
    /// prepares every catalogue entry. Dry-run sessions never connect.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Connect`] or [`WorkerError::Prepare`]; the
    /// session never reaches [`WorkerState::Ready`] in that case.
    pub fn start<C>(
        bootstrap: &WorkerBootstrap,
        connector: &C,
        output: W,
    ) -> Result<Self, WorkerError>
    where
        C: Connector<Database = D>,
    {
        let queries = bootstrap.queries();
        info!(
            target: SESSION_TARGET,
            dsn = bootstrap.connection().dsn(),
            queries = queries.len(),
            dry_run = bootstrap.dry_run(),
            "worker starting"
        );

        let (database, statements) = if bootstrap.dry_run() {
            (None, StatementCatalog::raw(queries))
        } else {
            let mut database = connector
                .connect(bootstrap.connection(), queries.len())
                .map_err(WorkerError::Connect)?;
            let statements = StatementCatalog::prepare_all(queries, &mut database)?;
            (Some(database), statements)
        };

        info!(
            target: SESSION_TARGET,
            statements = statements.len(),
            "worker ready"
        );
        Ok(Self {
            state: WorkerState::Ready,
            statements,
            database,
            output,
            throttle_pause: Duration::from_millis(bootstrap.throttle_pause_ms()),
        })
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.state
    }

    /// Consumes the session, returning the response stream.
    #[must_use]
    pub fn into_output(self) -> W {
        self.output
    }

    /// Serves requests from `input` until it closes or the termination
    /// command arrives, then releases the connection.
    ///
    /// Malformed request frames are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Read`] when the request stream becomes
    /// unreadable and [`WorkerError::Write`] when a response cannot be
    /// written. The connection is released in both cases.
    pub fn run<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<(), WorkerError> {
        let outcome = self.serve(input);
        self.shutdown();
        outcome
    }

    fn serve<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<(), WorkerError> {
        loop {
            match read_frame::<_, QueryRequest>(input) {
                Ok(Some(request)) if request.is_terminate() => {
                    info!(target: SESSION_TARGET, "termination command received");
                    return Ok(());
                }
                Ok(Some(request)) => self.handle(&request)?,
                Ok(None) => {
                    info!(target: SESSION_TARGET, "request stream closed");
                    return Ok(());
                }
                Err(error) if error.is_recoverable() => {
                    warn!(
                        target: SESSION_TARGET,
                        error = %error,
                        "skipping malformed request frame"
                    );
                }
                Err(error) => return Err(WorkerError::Read(error)),
            }
        }
    }

    /// Executes one request, streaming its response.
    ///
    /// Unknown query names, execution failures and rows too large to frame
    /// are logged and answered with nothing further.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Write`] when the response stream is gone.
    pub fn handle(&mut self, request: &QueryRequest) -> Result<(), WorkerError> {
        self.state = WorkerState::Processing;
        let outcome = self.dispatch(request);
        self.state = WorkerState::Ready;
        outcome
    }

    fn dispatch(&mut self, request: &QueryRequest) -> Result<(), WorkerError> {
        let name = request.query_name();
        match (self.statements.get(name), self.database.as_mut()) {
            (None, _) => {
                warn!(
                    target: SESSION_TARGET,
                    query = name,
                    route = request.route(),
                    "unknown query; no response will be sent"
                );
                Ok(())
            }
            (Some(StatementSlot::Raw { sql }), _) => {
                info!(
                    target: SESSION_TARGET,
                    query = name,
                    sql = %substitute(sql, request.bind_parameters()),
                    "dry run"
                );
                send(&mut self.output, request, Payload::Eof)
            }
            (Some(StatementSlot::Prepared { sql }), Some(database)) => {
                let pause = request.throttle().then_some(self.throttle_pause);
                execute_prepared(database, &mut self.output, request, sql, pause)
            }
            (Some(StatementSlot::Prepared { .. }), None) => {
                warn!(
                    target: SESSION_TARGET,
                    query = name,
                    "prepared statement without a connection; no response will be sent"
                );
                Ok(())
            }
        }
    }

    fn shutdown(&mut self) {
        self.state = WorkerState::Draining;
        if self.database.take().is_some() {
            debug!(target: SESSION_TARGET, "database connection released");
        }
        self.state = WorkerState::Terminated;
        info!(target: SESSION_TARGET, "worker terminated");
    }
}

fn execute_prepared<D, W>(
    database: &mut D,
    output: &mut W,
    request: &QueryRequest,
    sql: &str,
    pause: Option<Duration>,
) -> Result<(), WorkerError>
where
    D: Database,
    W: Write,
{
    let mut write_failure: Option<CodecError> = None;
    let mut rejected_row: Option<CodecError> = None;
    let mut first_row = true;
    let result = database.execute(
        sql,
        request.bind_parameters(),
        request.row_shape(),
        &mut |row| {
            if let Some(delay) = pause.filter(|delay| !first_row && !delay.is_zero()) {
                thread::sleep(delay);
            }
            first_row = false;
            let frame = encode_frame(&ResponseFrame::answering(request, Payload::Row(row)))
                .map_err(|error| {
                    let stop = io::Error::new(io::ErrorKind::InvalidData, error.to_string());
                    rejected_row = Some(error);
                    stop
                })?;
            deliver(&mut *output, &frame).map_err(|error| {
                let kind = error.kind();
                write_failure = Some(CodecError::from(error));
                io::Error::from(kind)
            })
        },
    );

    if let Some(codec) = write_failure {
        return Err(WorkerError::Write(codec));
    }
    if let Some(error) = rejected_row {
        warn!(
            target: SESSION_TARGET,
            query = request.query_name(),
            route = request.route(),
            error = %error,
            "row cannot be framed; request abandoned without EOF"
        );
        return Ok(());
    }

    match result {
        Ok(rows) => {
            debug!(
                target: SESSION_TARGET,
                query = request.query_name(),
                rows,
                "query complete"
            );
            send(output, request, Payload::Eof)
        }
        Err(error) => {
            warn!(
                target: SESSION_TARGET,
                query = request.query_name(),
                error = %error,
                "query failed; no response will be sent"
            );
            Ok(())
        }
    }
}

/// Writes `payload` for `request`. A frame that cannot be encoded is logged
/// and skipped; only a failing stream is an error.
fn send<W: Write + ?Sized>(
    output: &mut W,
    request: &QueryRequest,
    payload: Payload,
) -> Result<(), WorkerError> {
    match encode_frame(&ResponseFrame::answering(request, payload)) {
        Ok(frame) => {
            deliver(output, &frame).map_err(|error| WorkerError::Write(CodecError::from(error)))
        }
        Err(error) => {
            warn!(
                target: SESSION_TARGET,
                query = request.query_name(),
                route = request.route(),
                error = %error,
                "response cannot be framed; dropped"
            );
            Ok(())
        }
    }
}

fn deliver<W: Write + ?Sized>(output: &mut W, frame: &[u8]) -> io::Result<()> {
    output.write_all(frame)?;
    output.flush()
}

/// Reads the bootstrap frame from `input`, starts a session and serves
/// requests until shutdown.
///
/// # Errors
///
/// Returns [`WorkerError::MissingBootstrap`] or [`WorkerError::Bootstrap`]
/// when no usable bootstrap arrives, and any error from
/// [`WorkerSession::start`] or [`WorkerSession::run`].
pub fn run_worker<R, W, C>(input: &mut R, output: W, connector: &C) -> Result<(), WorkerError>
where
    R: Read + ?Sized,
    W: Write,
    C: Connector,
{
    let bootstrap: WorkerBootstrap = read_frame(input)
        .map_err(WorkerError::Bootstrap)?
        .ok_or(WorkerError::MissingBootstrap)?;
    let mut session = WorkerSession::start(&bootstrap, connector, output)?;
    session.run(input)
}
