//! Worker side of the query pool.
//!
//! A worker is a long-lived child process holding one database connection.
//! It reads a [`WorkerBootstrap`](querypool_protocol::WorkerBootstrap) frame
//! from stdin, prepares the query catalogue, then answers each request frame
//! with the result rows followed by exactly one EOF frame on stdout.
//!
//! Requests for unknown queries and requests whose execution fails get no
//! response at all; the failure is logged on stderr.

mod catalog;
mod database;
mod error;
mod session;
mod substitute;

pub use catalog::{StatementCatalog, StatementSlot};
pub use database::{Connector, Database, RowSink, SqliteConnector, SqliteDatabase};
pub use error::{DatabaseError, WorkerError};
pub use session::{WorkerSession, WorkerState, run_worker};
pub use substitute::substitute;
