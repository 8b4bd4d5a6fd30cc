use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use thiserror::Error;

/// Errors raised while resolving configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The layered loader rejected a source.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),

    /// The pool would start with no workers.
    #[error("worker_count must be at least 1")]
    NoWorkers,

    /// The query catalogue file could not be read.
    #[error("failed to read query catalogue {path}: {source}")]
    ReadQueries {
        /// Catalogue file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The query catalogue file is not valid TOML or lacks a `[queries]`
    /// table of strings.
    #[error("failed to parse query catalogue {path}: {source}")]
    ParseQueries {
        /// Catalogue file path.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Arc<toml::de::Error>,
    },

    /// A catalogue entry carries no SQL text.
    #[error("query '{name}' has an empty definition")]
    EmptyQuery {
        /// Offending query name.
        name: String,
    },
}
