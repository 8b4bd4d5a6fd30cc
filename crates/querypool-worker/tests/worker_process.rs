//! Drives the real worker executable over its stdio pipes.

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use querypool_protocol::{
    ConnectionDescriptor, FrameDecoder, Payload, QueryCatalog, QueryRequest, ResponseFrame, Row,
    Value, WorkerBootstrap, encode_frame,
};
use querypool_worker::SqliteDatabase;

const WORKER: &str = env!("CARGO_BIN_EXE_querypool-worker");

struct Outcome {
    success: bool,
    frames: Vec<ResponseFrame>,
}

fn run_worker(frames: &[Vec<u8>]) -> Outcome {
    let mut child = Command::new(WORKER)
        .args(["--log-format", "compact", "--log-filter", "warn"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn worker");

    {
        let mut stdin = child.stdin.take().expect("worker stdin");
        for frame in frames {
            stdin.write_all(frame).expect("write frame");
        }
    }

    let mut bytes = Vec::new();
    child
        .stdout
        .take()
        .expect("worker stdout")
        .read_to_end(&mut bytes)
        .expect("read stdout");
    let status = child.wait().expect("wait for worker");

    let mut decoder = FrameDecoder::new();
    decoder.extend(&bytes);
    let decoded = std::iter::from_fn(|| decoder.next_frame())
        .collect::<Result<Vec<ResponseFrame>, _>>()
        .expect("worker wrote valid frames");
    Outcome {
        success: status.success(),
        frames: decoded,
    }
}

#[fixture]
fn database_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

fn database_path(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("pool.sqlite")).expect("UTF-8 path")
}

fn bootstrap_for(dir: &TempDir, queries: QueryCatalog) -> Vec<u8> {
    let path = database_path(dir);
    encode_frame(&WorkerBootstrap::new(ConnectionDescriptor::new(path.as_str()), queries))
        .expect("encode bootstrap")
}

#[rstest]
fn answers_requests_and_exits_cleanly_on_close(database_dir: TempDir) {
    SqliteDatabase::open(database_path(&database_dir).as_str(), 4)
        .expect("create database")
        .execute_batch("create table t (id integer); insert into t values (2);")
        .expect("seed database");
    let queries = QueryCatalog::new()
        .with_query("insert", "insert into t (id) values (?)")
        .with_query("all", "select id from t order by id");
    let frames = vec![
        bootstrap_for(&database_dir, queries),
        encode_frame(&QueryRequest::new("insert", "setup").with_parameters(vec![Value::Integer(4)]))
            .expect("encode"),
        encode_frame(&QueryRequest::new("all", "read")).expect("encode"),
    ];

    let outcome = run_worker(&frames);

    assert!(outcome.success, "worker must exit with status 0");
    let read: Vec<&Payload> = outcome
        .frames
        .iter()
        .filter(|frame| frame.route() == "read")
        .map(ResponseFrame::payload)
        .collect();
    assert_eq!(
        read,
        vec![
            &Payload::Row(Row::Positional(vec![Value::Integer(2)])),
            &Payload::Row(Row::Positional(vec![Value::Integer(4)])),
            &Payload::Eof,
        ]
    );
}

#[rstest]
fn exits_cleanly_on_termination_command(database_dir: TempDir) {
    let frames = vec![
        bootstrap_for(&database_dir, QueryCatalog::new().with_query("one", "select 1")),
        encode_frame(&QueryRequest::terminate()).expect("encode"),
        encode_frame(&QueryRequest::new("one", "late")).expect("encode"),
    ];

    let outcome = run_worker(&frames);

    assert!(outcome.success);
    assert!(outcome.frames.is_empty());
}

#[rstest]
fn unpreparable_catalogue_is_fatal(database_dir: TempDir) {
    let frames = vec![bootstrap_for(
        &database_dir,
        QueryCatalog::new().with_query("broken", "select from where"),
    )];

    let outcome = run_worker(&frames);

    assert!(!outcome.success, "startup failure must exit non-zero");
    assert!(outcome.frames.is_empty());
}
