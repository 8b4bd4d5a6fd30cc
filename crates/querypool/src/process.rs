//! Worker process supervision.
//!
//! [`ProcessLauncher`] spawns the worker executable with piped stdio.
//! Each launched worker becomes a [`WorkerHandle`] owning its input stream
//! and a [`ProcessControl`] seam; the output and error streams are handed to
//! pump threads that forward bytes to the orchestrator and log stderr lines.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use querypool_config::LogSettings;

use crate::error::LaunchError;
use crate::pool::{HandleId, PoolMember};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
const WORKER_LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");
const READ_CHUNK: usize = 8 * 1024;

/// Signals used to stop workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful termination request (`SIGTERM`).
    Terminate,
    /// Forced termination (`SIGKILL`).
    Kill,
}

impl From<StopSignal> for Signal {
    fn from(signal: StopSignal) -> Self {
        match signal {
            StopSignal::Terminate => Self::SIGTERM,
            StopSignal::Kill => Self::SIGKILL,
        }
    }
}

/// Control over a running worker process.
pub trait ProcessControl: Send {
    /// Delivers `signal` to the process.
    ///
    /// # Errors
    ///
    /// Returns the OS error when delivery fails.
    fn signal(&mut self, signal: StopSignal) -> io::Result<()>;

    /// Collects the exit status if the process has finished.
    ///
    /// Returns `true` once the process has been reaped.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the status cannot be queried.
    fn try_reap(&mut self) -> io::Result<bool>;

    /// Blocks until the process exits and collects its status.
    ///
    /// # Errors
    ///
    /// Returns the OS error when waiting fails.
    fn reap(&mut self) -> io::Result<()>;
}

impl ProcessControl for Child {
    fn signal(&mut self, signal: StopSignal) -> io::Result<()> {
        let raw = i32::try_from(self.id())
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        kill(Pid::from_raw(raw), Signal::from(signal)).map_err(io::Error::from)
    }

    fn try_reap(&mut self) -> io::Result<bool> {
        let status = self.try_wait()?;
        if let Some(exit) = status {
            debug!(target: PROCESS_TARGET, pid = self.id(), status = %exit, "worker reaped");
        }
        Ok(status.is_some())
    }

    fn reap(&mut self) -> io::Result<()> {
        let status = self.wait()?;
        debug!(target: PROCESS_TARGET, pid = self.id(), status = %status, "worker reaped");
        Ok(())
    }
}

/// Streams of a freshly launched worker, before it joins the pool.
pub struct LaunchedWorker {
    /// Operating-system process id.
    pub process_id: u32,
    /// Request stream (the worker's stdin).
    pub input: Box<dyn Write + Send>,
    /// Response stream (the worker's stdout).
    pub output: Box<dyn Read + Send>,
    /// Log stream (the worker's stderr), when captured.
    pub errors: Option<Box<dyn Read + Send>>,
    /// Signal and reap control.
    pub process: Box<dyn ProcessControl>,
}

impl fmt::Debug for LaunchedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedWorker")
            .field("process_id", &self.process_id)
            .field("errors", &self.errors.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts worker processes.
pub trait WorkerLauncher {
    /// Launches the worker at position `index` of the startup batch.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the worker cannot be started.
    fn launch(&self, index: usize) -> Result<LaunchedWorker, LaunchError>;
}

/// Launches the worker executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: Utf8PathBuf,
    log: LogSettings,
}

impl ProcessLauncher {
    /// Builds a launcher for `program` that forwards `log` to each worker.
    #[must_use]
    pub const fn new(program: Utf8PathBuf, log: LogSettings) -> Self {
        Self { program, log }
    }

    /// Returns the worker executable path.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, index: usize) -> Result<LaunchedWorker, LaunchError> {
        debug!(
            target: PROCESS_TARGET,
            program = %self.program,
            index,
            "spawning worker"
        );
        let mut child = Command::new(self.program.as_std_path())
            .arg("--log-filter")
            .arg(self.log.filter())
            .arg("--log-format")
            .arg(self.log.format().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source: Arc::new(source),
            })?;

        let process_id = child.id();
        let (Some(input), Some(output)) = (child.stdin.take(), child.stdout.take()) else {
            drop(child.kill());
            drop(child.wait());
            return Err(LaunchError::MissingPipe {
                process_id,
                stream: "stdin or stdout",
            });
        };
        let errors = child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Box<dyn Read + Send>);

        Ok(LaunchedWorker {
            process_id,
            input: Box::new(input),
            output: Box::new(output),
            errors,
            process: Box::new(child),
        })
    }
}

/// The orchestrator's side of one pooled worker.
pub struct WorkerHandle {
    handle_id: HandleId,
    process_id: u32,
    input: Option<Box<dyn Write + Send>>,
    process: Box<dyn ProcessControl>,
}

impl WorkerHandle {
    /// Assembles a handle from its parts.
    #[must_use]
    pub const fn new(
        handle_id: HandleId,
        process_id: u32,
        input: Box<dyn Write + Send>,
        process: Box<dyn ProcessControl>,
    ) -> Self {
        Self {
            handle_id,
            process_id,
            input: Some(input),
            process,
        }
    }

    /// Writes one encoded frame to the worker's input and flushes it.
    ///
    /// # Errors
    ///
    /// Returns `BrokenPipe` once the input has been closed, or the write
    /// error reported by the stream.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        input.write_all(frame)?;
        input.flush()
    }

    /// Closes the worker's input stream. Returns `false` if already closed.
    pub fn close_input(&mut self) -> bool {
        self.input.take().is_some()
    }

    /// See [`ProcessControl::try_reap`].
    ///
    /// # Errors
    ///
    /// Propagates the process control error.
    pub fn try_reap(&mut self) -> io::Result<bool> {
        self.process.try_reap()
    }

    /// See [`ProcessControl::reap`].
    ///
    /// # Errors
    ///
    /// Propagates the process control error.
    pub fn reap(&mut self) -> io::Result<()> {
        self.process.reap()
    }
}

impl PoolMember for WorkerHandle {
    fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    fn process_id(&self) -> u32 {
        self.process_id
    }

    fn signal(&mut self, signal: StopSignal) -> io::Result<()> {
        debug!(
            target: PROCESS_TARGET,
            handle = %self.handle_id,
            pid = self.process_id,
            ?signal,
            "signalling worker"
        );
        self.process.signal(signal)
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("handle_id", &self.handle_id)
            .field("process_id", &self.process_id)
            .field("input_open", &self.input.is_some())
            .finish_non_exhaustive()
    }
}

/// Output observed on a worker's response stream.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// Raw bytes, in stream order.
    Output { handle: HandleId, bytes: Vec<u8> },
    /// The stream reached end-of-file or failed.
    Closed { handle: HandleId },
}

/// Forwards every chunk of `output` to `events` until the stream closes.
pub(crate) fn spawn_output_pump(
    handle: HandleId,
    process_id: u32,
    mut output: Box<dyn Read + Send>,
    events: Sender<WorkerEvent>,
) -> Result<(), LaunchError> {
    thread::Builder::new()
        .name(format!("querypool-out-{}", handle.get()))
        .spawn(move || {
            let mut buffer = vec![0_u8; READ_CHUNK];
            loop {
                match output.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => {
                        let bytes = buffer.get(..read).unwrap_or_default().to_vec();
                        if events.send(WorkerEvent::Output { handle, bytes }).is_err() {
                            return;
                        }
                    }
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                    Err(error) => {
                        warn!(
                            target: PROCESS_TARGET,
                            handle = %handle,
                            pid = process_id,
                            error = %error,
                            "worker output stream failed"
                        );
                        break;
                    }
                }
            }
            events.send(WorkerEvent::Closed { handle }).ok();
        })
        .map(drop)
        .map_err(|source| LaunchError::Pump {
            process_id,
            source: Arc::new(source),
        })
}

/// Logs each line of `errors` under the worker's ids.
pub(crate) fn spawn_error_pump(
    handle: HandleId,
    process_id: u32,
    errors: Box<dyn Read + Send>,
) -> Result<(), LaunchError> {
    thread::Builder::new()
        .name(format!("querypool-err-{}", handle.get()))
        .spawn(move || {
            let logged = forward_error_lines(handle, process_id, errors);
            debug!(
                target: PROCESS_TARGET,
                handle = %handle,
                pid = process_id,
                lines = logged,
                "worker error stream closed"
            );
        })
        .map(drop)
        .map_err(|source| LaunchError::Pump {
            process_id,
            source: Arc::new(source),
        })
}

/// Logs every non-blank line of `errors` until it ends or fails; returns
/// the number of lines logged.
fn forward_error_lines<R: Read>(handle: HandleId, process_id: u32, errors: R) -> usize {
    let mut logged = 0_usize;
    for line in BufReader::new(errors).lines() {
        match line {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => {
                info!(
                    target: WORKER_LOG_TARGET,
                    handle = %handle,
                    pid = process_id,
                    line = %text,
                    "worker log"
                );
                logged = logged.saturating_add(1);
            }
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    handle = %handle,
                    pid = process_id,
                    error = %error,
                    "worker error stream failed"
                );
                break;
            }
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    /// Yields `prefix`, then fails.
    struct FailingStream {
        prefix: Cursor<Vec<u8>>,
    }

    impl Read for FailingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.prefix.read(buf)? {
                0 => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
                read => Ok(read),
            }
        }
    }

    #[rstest]
    #[case::plain("ready\nserving\n", 2)]
    #[case::blank_lines_skipped("first\n\n   \nsecond\n", 2)]
    #[case::unterminated_tail("only line", 1)]
    #[case::empty("", 0)]
    fn error_lines_are_logged_until_the_stream_ends(#[case] stderr: &str, #[case] expected: usize) {
        let logged = forward_error_lines(HandleId::new(0), 42, Cursor::new(stderr.to_owned()));
        assert_eq!(logged, expected);
    }

    #[test]
    fn failing_error_stream_stops_the_pump() {
        let stream = FailingStream {
            prefix: Cursor::new(b"one\ntwo\n".to_vec()),
        };
        assert_eq!(forward_error_lines(HandleId::new(0), 42, stream), 2);
    }

    #[test]
    fn error_pump_thread_starts() {
        let errors: Box<dyn Read + Send> = Box::new(Cursor::new(b"boot\n".to_vec()));
        assert!(spawn_error_pump(HandleId::new(3), 7, errors).is_ok());
    }

    #[test]
    fn output_pump_forwards_bytes_then_reports_closure() {
        let (sender, events) = mpsc::channel();
        let output: Box<dyn Read + Send> = Box::new(Cursor::new(b"frame".to_vec()));
        spawn_output_pump(HandleId::new(1), 7, output, sender).expect("pump starts");

        let first = events
            .recv_timeout(Duration::from_secs(5))
            .expect("output event");
        assert!(matches!(
            first,
            WorkerEvent::Output { handle, ref bytes } if handle == HandleId::new(1) && bytes.as_slice() == b"frame"
        ));
        let last = events
            .recv_timeout(Duration::from_secs(5))
            .expect("closed event");
        assert!(matches!(last, WorkerEvent::Closed { handle } if handle == HandleId::new(1)));
    }
}
