//! Caller-owned mapping from response routes to handlers.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use querypool_protocol::{CorrelationId, Payload, ResponseFrame};

const ROUTES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::routes");

/// Callback invoked once per response frame delivered on a route.
pub type RouteHandler = Box<dyn FnMut(Payload, Option<&CorrelationId>)>;

/// Handlers keyed by route name.
#[derive(Default)]
pub struct RouteTable {
    handlers: HashMap<String, RouteHandler>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `route`, replacing any previous handler.
    pub fn register<F>(&mut self, route: impl Into<String>, handler: F)
    where
        F: FnMut(Payload, Option<&CorrelationId>) + 'static,
    {
        self.handlers.insert(route.into(), Box::new(handler));
    }

    /// Builder form of [`RouteTable::register`].
    #[must_use]
    pub fn with_route<F>(mut self, route: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(Payload, Option<&CorrelationId>) + 'static,
    {
        self.register(route, handler);
        self
    }

    /// Whether a handler exists for `route`.
    #[must_use]
    pub fn contains(&self, route: &str) -> bool {
        self.handlers.contains_key(route)
    }

    /// Hands `frame` to its route's handler.
    ///
    /// Returns `false`, after logging, when no handler is registered.
    pub fn deliver(&mut self, frame: ResponseFrame) -> bool {
        let (route, correlation_id, payload) = frame.into_parts();
        let Some(handler) = self.handlers.get_mut(&route) else {
            warn!(
                target: ROUTES_TARGET,
                route = %route,
                correlation_id = ?correlation_id,
                "no handler registered for route; frame dropped"
            );
            return false;
        };
        handler(payload, correlation_id.as_ref());
        true
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        routes.sort_unstable();
        f.debug_struct("RouteTable").field("routes", &routes).finish()
    }
}
