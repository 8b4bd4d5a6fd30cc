//! Binary entrypoint for a query pool worker.
//!
//! stdin carries the bootstrap and request frames, stdout carries response
//! frames and stderr carries logs.

use std::io::{self, BufReader, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;

use querypool_config::{LogFormat, LogSettings, default_log_filter_string, initialise};
use querypool_worker::{SqliteConnector, run_worker};

/// Command-line options for the worker process.
#[derive(Debug, Parser)]
#[command(name = "querypool-worker", version, about = "Query pool worker process")]
struct Args {
    /// `tracing` filter expression.
    #[arg(long, default_value_t = default_log_filter_string())]
    log_filter: String,
    /// Log output format.
    #[arg(long, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let settings = LogSettings::new(args.log_filter, args.log_format);
    if let Err(error) = initialise(&settings) {
        writeln!(io::stderr().lock(), "querypool-worker: {error}").ok();
        return ExitCode::FAILURE;
    }

    let mut input = BufReader::new(io::stdin().lock());
    let output = BufWriter::new(io::stdout().lock());

    match run_worker(&mut input, output, &SqliteConnector) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::main"),
                error = %error,
                startup = error.is_startup(),
                "worker exiting"
            );
            ExitCode::FAILURE
        }
    }
}
