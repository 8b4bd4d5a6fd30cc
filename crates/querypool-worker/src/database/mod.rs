//! The "execute query, get rows" seam between the session and a driver.

mod sqlite;

use std::io;

use querypool_protocol::{ConnectionDescriptor, Row, RowShape, Value};

use crate::error::DatabaseError;

pub use sqlite::{SqliteConnector, SqliteDatabase};

/// Receives rows as they are fetched.
///
/// Returning an error stops the cursor; the statement's execution then fails
/// with [`DatabaseError::Sink`].
pub type RowSink<'a> = dyn FnMut(Row) -> io::Result<()> + 'a;

/// One open database connection.
pub trait Database {
    /// Compiles `sql` ahead of use.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Prepare`] when the statement is invalid.
    fn prepare(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Executes `sql` with positional `parameters`, handing every result row
    /// to `sink` in cursor order, shaped per `shape`.
    ///
    /// Statements without a result set produce no rows. Returns the number of
    /// rows delivered.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Execute`] when binding or stepping fails and
    /// [`DatabaseError::Sink`] when `sink` refuses a row.
    fn execute(
        &mut self,
        sql: &str,
        parameters: &[Value],
        shape: RowShape,
        sink: &mut RowSink<'_>,
    ) -> Result<usize, DatabaseError>;
}

/// Opens connections from a bootstrap descriptor.
pub trait Connector {
    /// Connection type produced.
    type Database: Database;

    /// Opens one connection able to cache `statements` prepared statements.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connect`] when the connection cannot be
    /// opened.
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        statements: usize,
    ) -> Result<Self::Database, DatabaseError>;
}
