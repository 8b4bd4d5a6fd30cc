//! Scalar values and row payloads.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A scalar bind parameter or column value.
///
/// Serialised untagged so frames carry natural JSON scalars: `null`, `true`,
/// `42`, `1.5`, `"text"`. Blobs travel as `{"base64": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// A boolean flag.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(#[serde(with = "blob")] Vec<u8>),
}

mod blob {
    use serde::de::Error as _;

    use super::{BASE64, Deserialize, Deserializer, Engine, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Encoded<T> {
        base64: T,
    }

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Encoded {
            base64: BASE64.encode(bytes),
        }
        .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = Encoded::<String>::deserialize(deserializer)?;
        BASE64.decode(encoded.base64).map_err(D::Error::custom)
    }
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub const fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("NULL"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::Real(value) => write!(formatter, "{value}"),
            Self::Text(value) => formatter.write_str(value),
            Self::Blob(bytes) => write!(formatter, "<{} bytes>", bytes.len()),
        }
    }
}

/// How a worker should shape the rows it streams back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowShape {
    /// Ordered column values.
    #[default]
    Positional,
    /// Column name to value mapping.
    Named,
}

/// One result row.
///
/// Named rows collapse duplicate column names; the last column wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Row {
    /// Column values in select-list order.
    Positional(Vec<Value>),
    /// Column values keyed by column name.
    Named(BTreeMap<String, Value>),
}

impl Row {
    /// Returns the shape this row was produced in.
    #[must_use]
    pub const fn shape(&self) -> RowShape {
        match self {
            Self::Positional(_) => RowShape::Positional,
            Self::Named(_) => RowShape::Named,
        }
    }

    /// Number of columns carried by the row.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(columns) => columns.len(),
        }
    }

    /// Returns `true` when the row carries no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a value by column name. Positional rows have no names.
    #[must_use]
    pub fn get_named(&self, column: &str) -> Option<&Value> {
        match self {
            Self::Positional(_) => None,
            Self::Named(columns) => columns.get(column),
        }
    }

    /// Looks up a value by position. Named rows have no stable positions.
    #[must_use]
    pub fn get_positional(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Named(_) => None,
        }
    }
}
