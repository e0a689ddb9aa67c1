//! Route groups sharing a path prefix and middleware.

use axum::http::Method;

use crate::http::{Handler, Middleware};
use crate::routing::pattern::RouteError;
use crate::routing::router::Router;

/// Registers routes on the underlying [`Router`] with a common prefix.
///
/// The group owns no routes. Its pattern is `prefix + pattern` (plain
/// concatenation) and its middleware runs after the global chain and before
/// any route-local middleware.
#[derive(Debug)]
pub struct RouterGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<Middleware>,
}

impl<'r> RouterGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: String, middleware: Vec<Middleware>) -> Self {
        Self {
            router,
            prefix,
            middleware,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append group middleware. Affects routes registered afterwards.
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> Result<&mut Self, RouteError> {
        let pattern = format!("{}{}", self.prefix, pattern);
        let chain = self.middleware.iter().cloned().chain(middleware).collect();
        self.router.add_route(method, &pattern, handler, chain)?;
        Ok(self)
    }

    all_verb_methods!();

    /// A nested group; prefixes and middleware concatenate.
    pub fn group(&mut self, prefix: &str, middleware: Vec<Middleware>) -> RouterGroup<'_> {
        let prefix = format!("{}{}", self.prefix, prefix);
        let chain = self.middleware.iter().cloned().chain(middleware).collect();
        RouterGroup::new(&mut *self.router, prefix, chain)
    }
}
