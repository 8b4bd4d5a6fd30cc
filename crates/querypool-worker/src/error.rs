//! Error types for the worker process.

use std::io;
use std::sync::Arc;

use querypool_protocol::CodecError;
use thiserror::Error;

/// Errors raised by a [`Database`](crate::Database) implementation.
#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    /// The connection could not be opened.
    #[error("failed to connect to '{dsn}': {message}")]
    Connect {
        /// Database address.
        dsn: String,
        /// Driver message.
        message: String,
    },

    /// A statement failed to prepare.
    #[error("failed to prepare statement: {message}")]
    Prepare {
        /// Driver message.
        message: String,
    },

    /// A statement failed while binding or executing.
    #[error("failed to execute statement: {message}")]
    Execute {
        /// Driver message.
        message: String,
    },

    /// The row sink refused a row and stopped the cursor.
    #[error("row sink rejected a row: {0}")]
    Sink(#[source] Arc<io::Error>),
}

/// Fatal errors that end a worker session.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The input closed before a bootstrap frame arrived.
    #[error("input closed before the bootstrap frame arrived")]
    MissingBootstrap,

    /// The bootstrap frame could not be decoded.
    #[error("failed to read bootstrap frame: {0}")]
    Bootstrap(#[source] CodecError),

    /// The database connection could not be opened.
    #[error("database connection failed: {0}")]
    Connect(#[source] DatabaseError),

    /// A catalogue entry failed to prepare.
    #[error("failed to prepare query '{name}': {source}")]
    Prepare {
        /// Query name.
        name: String,
        /// Driver error.
        #[source]
        source: DatabaseError,
    },

    /// The request stream failed or became unreadable.
    #[error("request stream failed: {0}")]
    Read(#[source] CodecError),

    /// A response frame could not be written.
    #[error("failed to write response frame: {0}")]
    Write(#[source] CodecError),
}

impl WorkerError {
    /// Returns `true` for errors raised before the session reached Ready.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::MissingBootstrap | Self::Bootstrap(_) | Self::Connect(_) | Self::Prepare { .. }
        )
    }
}
