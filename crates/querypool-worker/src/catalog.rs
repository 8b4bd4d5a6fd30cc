//! Per-worker statement catalogue.

use std::collections::BTreeMap;

use querypool_protocol::QueryCatalog;

use crate::database::Database;
use crate::error::WorkerError;

/// How a query is held by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementSlot {
    /// Compiled on the worker's connection; executed with bound parameters.
    Prepared {
        /// SQL text, also the statement cache key.
        sql: String,
    },
    /// Kept as text only. Dry-run workers hold every query this way.
    Raw {
        /// SQL text with `?` placeholders.
        sql: String,
    },
}

impl StatementSlot {
    /// Returns the SQL text.
    #[must_use]
    pub const fn sql(&self) -> &str {
        match self {
            Self::Prepared { sql } | Self::Raw { sql } => sql.as_str(),
        }
    }
}

/// Query name to statement mapping built once at startup.
#[derive(Debug, Clone, Default)]
pub struct StatementCatalog {
    slots: BTreeMap<String, StatementSlot>,
}

impl StatementCatalog {
    /// Eagerly prepares every catalogue entry on `database`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Prepare`] for the first entry that fails; the
    /// worker must not enter service with a partial catalogue.
    pub fn prepare_all<D: Database>(
        queries: &QueryCatalog,
        database: &mut D,
    ) -> Result<Self, WorkerError> {
        let mut slots = BTreeMap::new();
        for (name, sql) in queries.iter() {
            database
                .prepare(sql)
                .map_err(|source| WorkerError::Prepare {
                    name: name.to_owned(),
                    source,
                })?;
            slots.insert(
                name.to_owned(),
                StatementSlot::Prepared {
                    sql: sql.to_owned(),
                },
            );
        }
        Ok(Self { slots })
    }

    /// Holds every entry as raw text without touching a database.
    #[must_use]
    pub fn raw(queries: &QueryCatalog) -> Self {
        let slots = queries
            .iter()
            .map(|(name, sql)| {
                (
                    name.to_owned(),
                    StatementSlot::Raw {
                        sql: sql.to_owned(),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Looks up a statement by query name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StatementSlot> {
        self.slots.get(name)
    }

    /// Number of statements held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when the catalogue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
