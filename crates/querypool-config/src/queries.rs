//! Query catalogue loading.
//!
//! Catalogues are TOML documents with a single `[queries]` table mapping
//! each query name to its SQL text:
//!
//! ```toml
//! [queries]
//! select_one = "select 1"
//! user_by_id = "select id, name from users where id = ?"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use serde::Deserialize;

use querypool_protocol::QueryCatalog;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogueFile {
    #[serde(default)]
    queries: BTreeMap<String, String>,
}

/// Reads and validates the catalogue stored at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::ReadQueries`] when the file cannot be read and
/// any error from [`parse_catalogue`].
pub fn load_catalogue(path: &Utf8Path) -> Result<QueryCatalog, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadQueries {
        path: path.to_owned(),
        source: Arc::new(source),
    })?;
    parse_catalogue(path, &text)
}

/// Parses catalogue text. `origin` only labels errors.
///
/// # Errors
///
/// Returns [`ConfigError::ParseQueries`] for malformed TOML and
/// [`ConfigError::EmptyQuery`] for a blank definition.
pub fn parse_catalogue(origin: &Utf8Path, text: &str) -> Result<QueryCatalog, ConfigError> {
    let file: CatalogueFile = toml::from_str(text).map_err(|source| ConfigError::ParseQueries {
        path: origin.to_owned(),
        source: Arc::new(source),
    })?;

    if let Some((name, _)) = file.queries.iter().find(|(_, sql)| sql.trim().is_empty()) {
        return Err(ConfigError::EmptyQuery { name: name.clone() });
    }

    Ok(file.queries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn origin() -> &'static Utf8Path {
        Utf8Path::new("queries.toml")
    }

    #[test]
    fn parses_queries_table() {
        let catalog = parse_catalogue(
            origin(),
            "[queries]\nselect_one = \"select 1\"\ndelete_row = \"delete from t where id = ?\"\n",
        )
        .expect("parse catalogue");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("select_one"), Some("select 1"));
    }

    #[test]
    fn missing_table_yields_empty_catalogue() {
        let catalog = parse_catalogue(origin(), "").expect("parse empty");
        assert!(catalog.is_empty());
    }

    #[rstest]
    #[case::not_toml("[queries\n")]
    #[case::non_string("[queries]\ncount = 3\n")]
    #[case::unknown_table("[other]\nx = \"y\"\n")]
    fn malformed_catalogues_are_rejected(#[case] text: &str) {
        let error = parse_catalogue(origin(), text).expect_err("must fail");
        assert!(matches!(error, ConfigError::ParseQueries { .. }));
    }

    #[test]
    fn blank_definitions_are_rejected() {
        let error =
            parse_catalogue(origin(), "[queries]\nblank = \"  \"\n").expect_err("must fail");
        assert!(matches!(error, ConfigError::EmptyQuery { name } if name == "blank"));
    }
}
