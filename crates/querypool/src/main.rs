//! Batch front end for the query pool.
//!
//! Reads one JSON request per line on stdin, for example
//! `{"query": "by_id", "params": [1], "shape": "named", "throttle": false}`,
//! dispatches each with its line number as the correlation id and writes
//! every response frame to stdout as a JSON line. The pool shuts down once
//! every request has reached EOF, when output stops arriving, or on
//! `SIGINT`/`SIGTERM`.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::{error, info, warn};

use querypool::{
    DispatchError, Orchestrator, OrchestratorError, PoolSettings, ProcessLauncher, RouteTable,
    StructuredPoolReporter, resolve_worker_program,
};
use querypool_config::{Config, initialise};
use querypool_protocol::{CorrelationId, QueryRequest, ResponseFrame, RowShape, Value};

const MAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::main");
const OUTPUT_ROUTE: &str = "stdout";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One line of batch input.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchRequest {
    query: String,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    shape: RowShape,
    #[serde(default)]
    throttle: bool,
}

impl BatchRequest {
    fn into_request(self, line: u64) -> QueryRequest {
        let request = QueryRequest::new(self.query, OUTPUT_ROUTE)
            .with_parameters(self.params)
            .with_correlation_id(CorrelationId::from(line))
            .with_row_shape(self.shape);
        if self.throttle {
            request.throttled()
        } else {
            request
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            writeln!(io::stderr().lock(), "querypool: {error}").ok();
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = initialise(&config.log_settings()) {
        writeln!(io::stderr().lock(), "querypool: {error}").ok();
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(target: MAIN_TARGET, error = %failure, "querypool failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), OrchestratorError> {
    let settings = PoolSettings::from_config(config)?;
    let launcher = ProcessLauncher::new(resolve_worker_program(config), config.log_settings());
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .map_err(|source| OrchestratorError::Signals(Arc::new(source)))?;
    }

    let mut orchestrator = Orchestrator::start(
        &settings,
        &launcher,
        output_routes(),
        Arc::new(StructuredPoolReporter::new()),
    )?;

    let outcome = submit_stdin(&mut orchestrator).and_then(|submitted| {
        info!(target: MAIN_TARGET, submitted, "all requests submitted");
        drain(&mut orchestrator, &stop);
        Ok(())
    });

    let report = orchestrator.shutdown();
    info!(
        target: MAIN_TARGET,
        graceful = report.graceful(),
        killed = report.killed(),
        "batch finished"
    );
    outcome
}

fn output_routes() -> RouteTable {
    RouteTable::new().with_route(OUTPUT_ROUTE, |payload, correlation_id| {
        let frame = ResponseFrame::new(OUTPUT_ROUTE, correlation_id.cloned(), payload);
        if let Err(failure) = emit(&mut io::stdout().lock(), &frame) {
            warn!(target: MAIN_TARGET, error = %failure, "failed to write response");
        }
    })
}

fn emit<W: Write>(out: &mut W, frame: &ResponseFrame) -> io::Result<()> {
    serde_json::to_writer(&mut *out, frame)?;
    writeln!(out)?;
    out.flush()
}

/// Dispatches every stdin line; returns the number of requests submitted.
fn submit_stdin(orchestrator: &mut Orchestrator) -> Result<usize, OrchestratorError> {
    let mut submitted = 0;
    for (line_number, line) in (1_u64..).zip(io::stdin().lock().lines()) {
        let text = line.map_err(|source| OrchestratorError::Stream(Arc::new(source)))?;
        if text.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<BatchRequest>(&text) {
            Ok(parsed) => parsed.into_request(line_number),
            Err(failure) => {
                warn!(
                    target: MAIN_TARGET,
                    line = line_number,
                    error = %failure,
                    "skipping unparseable request"
                );
                continue;
            }
        };
        match orchestrator.dispatch(&request) {
            Ok(_) => submitted += 1,
            Err(DispatchError::EmptyPool) => {
                warn!(target: MAIN_TARGET, line = line_number, "no workers left");
                break;
            }
            Err(failure) => warn!(
                target: MAIN_TARGET,
                line = line_number,
                error = %failure,
                "request not dispatched"
            ),
        }
        orchestrator.pump(Duration::ZERO);
    }
    Ok(submitted)
}

/// Pumps responses until every request has completed, output goes quiet
/// for [`IDLE_TIMEOUT`], every worker is gone, or a stop signal arrives.
fn drain(orchestrator: &mut Orchestrator, stop: &AtomicBool) {
    let mut last_activity = Instant::now();
    loop {
        if stop.load(Ordering::Relaxed) {
            info!(target: MAIN_TARGET, "stop signal received");
            return;
        }
        if orchestrator.outstanding() == 0 {
            return;
        }
        if orchestrator.worker_count() == 0 {
            warn!(
                target: MAIN_TARGET,
                outstanding = orchestrator.outstanding(),
                "every worker has exited"
            );
            return;
        }
        if orchestrator.pump(POLL_INTERVAL) > 0 {
            last_activity = Instant::now();
        } else if last_activity.elapsed() >= IDLE_TIMEOUT {
            warn!(
                target: MAIN_TARGET,
                outstanding = orchestrator.outstanding(),
                "no output within the idle timeout; abandoning stalled requests"
            );
            return;
        }
    }
}
