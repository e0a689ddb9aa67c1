//! A single entry of the route table.

use axum::http::Method;

use crate::http::{Handler, Middleware};
use crate::routing::pattern::{CompiledPattern, Params};

/// Method, compiled path matcher, handler and route-local middleware.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    pattern: CompiledPattern,
    handler: Handler,
    middleware: Vec<Middleware>,
}

impl Route {
    pub fn new(
        method: Method,
        pattern: CompiledPattern,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> Self {
        Self {
            method,
            pattern,
            handler,
            middleware,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Middleware that runs after the global chain, outermost first.
    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Params for `path` if both the method and the path match.
    pub fn matches(&self, method: &Method, path: &str) -> Option<Params> {
        if self.method != *method {
            return None;
        }
        self.pattern.captures(path)
    }
}
