//! Request frames sent from the orchestrator to a worker.

use serde::{Deserialize, Serialize};

use crate::value::{RowShape, Value};

/// Reserved query name instructing a worker to leave its request loop.
pub const TERMINATE_QUERY: &str = "__terminate__";

/// Opaque caller token echoed back on every response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(serde_json::Value);

impl CorrelationId {
    /// Wraps an arbitrary JSON token.
    #[must_use]
    pub const fn new(token: serde_json::Value) -> Self {
        Self(token)
    }

    /// Returns the wrapped token.
    #[must_use]
    pub const fn token(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::from(value))
    }
}

/// A single query invocation.
///
/// # Example
///
/// ```
/// use querypool_protocol::{QueryRequest, RowShape, Value};
///
/// let request = QueryRequest::new("orders_for_user", "orders")
///     .with_parameters(vec![Value::from(7_i64)])
///     .with_correlation_id("req-1".into())
///     .with_row_shape(RowShape::Named)
///     .throttled();
/// assert_eq!(request.query_name(), "orders_for_user");
/// assert!(request.throttle());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    query_name: String,
    route: String,
    #[serde(default)]
    bind_parameters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
    #[serde(default)]
    row_shape: RowShape,
    #[serde(default)]
    throttle: bool,
}

impl QueryRequest {
    /// Creates a request for `query_name` answered under `route`.
    #[must_use]
    pub fn new(query_name: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            route: route.into(),
            bind_parameters: Vec::new(),
            correlation_id: None,
            row_shape: RowShape::Positional,
            throttle: false,
        }
    }

    /// Builds the termination command.
    #[must_use]
    pub fn terminate() -> Self {
        Self::new(TERMINATE_QUERY, "")
    }

    /// Sets the positional bind parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.bind_parameters = parameters;
        self
    }

    /// Attaches a correlation token.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Chooses the row shape.
    #[must_use]
    pub const fn with_row_shape(mut self, shape: RowShape) -> Self {
        self.row_shape = shape;
        self
    }

    /// Asks the worker to pause between rows.
    #[must_use]
    pub const fn throttled(mut self) -> Self {
        self.throttle = true;
        self
    }

    /// Returns the query name.
    #[must_use]
    pub const fn query_name(&self) -> &str {
        self.query_name.as_str()
    }

    /// Returns the caller route.
    #[must_use]
    pub const fn route(&self) -> &str {
        self.route.as_str()
    }

    /// Returns the bind parameters.
    #[must_use]
    pub fn bind_parameters(&self) -> &[Value] {
        &self.bind_parameters
    }

    /// Returns the correlation token, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Returns the requested row shape.
    #[must_use]
    pub const fn row_shape(&self) -> RowShape {
        self.row_shape
    }

    /// Returns the throttle hint.
    #[must_use]
    pub const fn throttle(&self) -> bool {
        self.throttle
    }

    /// Returns `true` for the termination command.
    #[must_use]
    pub fn is_terminate(&self) -> bool {
        self.query_name == TERMINATE_QUERY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_fills_defaults() {
        let json = r#"{"query_name":"q","route":"r"}"#;
        let request: QueryRequest = serde_json::from_str(json).expect("decode request");
        assert_eq!(request.row_shape(), RowShape::Positional);
        assert!(request.bind_parameters().is_empty());
        assert!(request.correlation_id().is_none());
        assert!(!request.throttle());
    }

    #[test]
    fn terminate_command_is_recognised() {
        assert!(QueryRequest::terminate().is_terminate());
        assert!(!QueryRequest::new("select_one", "r").is_terminate());
    }

    #[test]
    fn structured_correlation_tokens_survive_serialisation() {
        let token = CorrelationId::new(serde_json::json!({"call": 3, "tag": ["a", "b"]}));
        let request = QueryRequest::new("q", "r").with_correlation_id(token.clone());
        let json = serde_json::to_string(&request).expect("encode request");
        let back: QueryRequest = serde_json::from_str(&json).expect("decode request");
        assert_eq!(back.correlation_id(), Some(&token));
    }
}
