//! Response frames streamed from a worker back to the orchestrator.

use serde::{Deserialize, Serialize};

use crate::request::{CorrelationId, QueryRequest};
use crate::value::Row;

/// Payload of one response frame.
///
/// Every request's response stream ends with exactly one [`Payload::Eof`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "snake_case")]
pub enum Payload {
    /// One result row.
    Row(Row),
    /// End of the result stream.
    Eof,
}

impl Payload {
    /// Returns `true` for the EOF sentinel.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Returns the row, if this payload carries one.
    #[must_use]
    pub const fn row(&self) -> Option<&Row> {
        match self {
            Self::Row(row) => Some(row),
            Self::Eof => None,
        }
    }
}

/// One framed response: where it goes, which call it answers, and what it
/// carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
    payload: Payload,
}

impl ResponseFrame {
    /// Creates a frame answering `request`, copying its route and
    /// correlation token unchanged.
    #[must_use]
    pub fn answering(request: &QueryRequest, payload: Payload) -> Self {
        Self {
            route: request.route().to_owned(),
            correlation_id: request.correlation_id().cloned(),
            payload,
        }
    }

    /// Creates a frame from its parts.
    #[must_use]
    pub fn new(
        route: impl Into<String>,
        correlation_id: Option<CorrelationId>,
        payload: Payload,
    ) -> Self {
        Self {
            route: route.into(),
            correlation_id,
            payload,
        }
    }

    /// Returns the route.
    #[must_use]
    pub const fn route(&self) -> &str {
        self.route.as_str()
    }

    /// Returns the correlation token, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Splits the frame into its route, correlation token and payload.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<CorrelationId>, Payload) {
        (self.route, self.correlation_id, self.payload)
    }
}
