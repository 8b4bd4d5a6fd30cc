//! The one-off frame that initialises a worker process.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Database address and credentials handed to every worker.
///
/// The password never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    dsn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl ConnectionDescriptor {
    /// Creates a descriptor without credentials.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            user: None,
            password: None,
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    /// Returns the database address.
    #[must_use]
    pub const fn dsn(&self) -> &str {
        self.dsn.as_str()
    }

    /// Returns the user name, if configured.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the password, if configured.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionDescriptor")
            .field("dsn", &self.dsn)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Named query definitions: query name to SQL text with `?` placeholders.
///
/// Immutable once handed to the orchestrator; every worker receives a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryCatalog {
    queries: BTreeMap<String, String>,
}

impl QueryCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, replacing any previous text under the same name.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.queries.insert(name.into(), sql.into());
        self
    }

    /// Returns the SQL text registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.queries.get(name).map(String::as_str)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` when no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Iterates definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.queries
            .iter()
            .map(|(name, sql)| (name.as_str(), sql.as_str()))
    }
}

impl FromIterator<(String, String)> for QueryCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            queries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for QueryCatalog {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.into_iter()
    }
}

/// First frame written to a worker's input stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerBootstrap {
    connection: ConnectionDescriptor,
    queries: QueryCatalog,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    throttle_pause_ms: u64,
}

impl WorkerBootstrap {
    /// Creates a bootstrap frame for a live database.
    #[must_use]
    pub const fn new(connection: ConnectionDescriptor, queries: QueryCatalog) -> Self {
        Self {
            connection,
            queries,
            dry_run: false,
            throttle_pause_ms: 0,
        }
    }

    /// Switches the worker into dry-run mode: raw statements, no database.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the pause inserted between rows of throttled requests.
    #[must_use]
    pub const fn with_throttle_pause_ms(mut self, millis: u64) -> Self {
        self.throttle_pause_ms = millis;
        self
    }

    /// Returns the connection descriptor.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// Returns the query catalogue.
    #[must_use]
    pub const fn queries(&self) -> &QueryCatalog {
        &self.queries
    }

    /// Returns whether the worker runs in dry-run mode.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the throttle pause in milliseconds.
    #[must_use]
    pub const fn throttle_pause_ms(&self) -> u64 {
        self.throttle_pause_ms
    }
}
