//! SQLite driver backed by `rusqlite`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Row as SqlRow, params_from_iter};

use querypool_protocol::{ConnectionDescriptor, Row, RowShape, Value};

use super::{Connector, Database, RowSink};
use crate::error::DatabaseError;

const MIN_STATEMENT_CACHE: usize = 16;

/// Opens [`SqliteDatabase`] connections. The descriptor's `dsn` is a file
/// path or `:memory:`; SQLite has no use for the credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    type Database = SqliteDatabase;

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        statements: usize,
    ) -> Result<SqliteDatabase, DatabaseError> {
        SqliteDatabase::open(descriptor.dsn(), statements)
    }
}

/// A single SQLite connection with a prepared-statement cache sized to hold
/// the whole query catalogue.
#[derive(Debug)]
pub struct SqliteDatabase {
    connection: Connection,
}

impl SqliteDatabase {
    /// Opens `dsn`, sizing the statement cache for `statements` entries.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connect`] when SQLite refuses the address.
    pub fn open(dsn: &str, statements: usize) -> Result<Self, DatabaseError> {
        let connection = Connection::open(dsn).map_err(|err| DatabaseError::Connect {
            dsn: dsn.to_owned(),
            message: err.to_string(),
        })?;
        connection.set_prepared_statement_cache_capacity(statements.max(MIN_STATEMENT_CACHE));
        Ok(Self { connection })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connect`] when SQLite cannot allocate it.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::open(":memory:", MIN_STATEMENT_CACHE)
    }

    /// Runs a batch of semicolon-separated statements, typically schema
    /// setup.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Execute`] when any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        self.connection.execute_batch(sql).map_err(execute_error)
    }
}

impl Database for SqliteDatabase {
    fn prepare(&mut self, sql: &str) -> Result<(), DatabaseError> {
        self.connection
            .prepare_cached(sql)
            .map(drop)
            .map_err(|err| DatabaseError::Prepare {
                message: err.to_string(),
            })
    }

    fn execute(
        &mut self,
        sql: &str,
        parameters: &[Value],
        shape: RowShape,
        sink: &mut RowSink<'_>,
    ) -> Result<usize, DatabaseError> {
        let mut statement = self.connection.prepare_cached(sql).map_err(execute_error)?;
        let bound = params_from_iter(parameters.iter().map(bind_value));

        if statement.column_count() == 0 {
            statement.execute(bound).map_err(execute_error)?;
            return Ok(0);
        }

        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut rows = statement.query(bound).map_err(execute_error)?;
        let mut delivered = 0_usize;
        while let Some(row) = rows.next().map_err(execute_error)? {
            let shaped = shape_row(row, &columns, shape)?;
            sink(shaped).map_err(|err| DatabaseError::Sink(Arc::new(err)))?;
            delivered = delivered.saturating_add(1);
        }
        Ok(delivered)
    }
}

fn execute_error(err: rusqlite::Error) -> DatabaseError {
    DatabaseError::Execute {
        message: err.to_string(),
    }
}

fn bind_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Real(number) => SqlValue::Real(*number),
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Integer(number),
        ValueRef::Real(number) => Value::Real(number),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

fn shape_row(row: &SqlRow<'_>, columns: &[String], shape: RowShape) -> Result<Row, DatabaseError> {
    let mut values = Vec::with_capacity(columns.len());
    for index in 0..columns.len() {
        values.push(column_value(row.get_ref(index).map_err(execute_error)?));
    }

    Ok(match shape {
        RowShape::Positional => Row::Positional(values),
        RowShape::Named => Row::Named(
            columns
                .iter()
                .cloned()
                .zip(values)
                .collect::<BTreeMap<_, _>>(),
        ),
    })
}
