//! Route table and request dispatch.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use tracing::Instrument;

use crate::config::RouterConfig;
use crate::http::context::{Context, RequestSettings};
use crate::http::middleware::{compose, logger, recovery};
use crate::http::{response, Handler, IntoFlow, Middleware};
use crate::routing::group::RouterGroup;
use crate::routing::pattern::{CompiledPattern, Params, PatternCompiler, RouteError};
use crate::routing::route::Route;
use crate::validation::Schema;

/// Regex based HTTP router.
///
/// Built through `&mut self` registration calls, then shared behind an
/// `Arc` and only read while serving.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    not_found: Option<Handler>,
    compiler: PatternCompiler,
    settings: Arc<RequestSettings>,
}

impl Router {
    /// An empty router.
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            routes: Vec::new(),
            middleware: Vec::new(),
            not_found: None,
            compiler: PatternCompiler::new(config.strict_slash),
            settings: Arc::new(RequestSettings {
                max_body_bytes: config.max_body_bytes,
                ..RequestSettings::default()
            }),
        }
    }

    /// A router with request logging and panic recovery installed. The
    /// logger is outermost so recovered panics are still logged as 500s.
    pub fn with_defaults(config: &RouterConfig) -> Self {
        let mut router = Self::new(config);
        router.middleware(logger()).middleware(recovery());
        router
    }

    /// Append a global middleware. Applies to routes served afterwards and
    /// to a not-found handler set afterwards.
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Register the validation schema for payloads bound to `T`.
    pub fn register_schema<T: 'static>(&mut self, schema: Schema) -> &mut Self {
        Arc::make_mut(&mut self.settings).validator.register::<T>(schema);
        self
    }

    /// Compile `pattern` and append a route.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> Result<&mut Self, RouteError> {
        let compiled = self.compiler.compile(pattern)?;
        Ok(self.push_route(method, compiled, handler, middleware))
    }

    /// Register a route for any method from a closure.
    pub fn route<F, Fut, R>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: F,
    ) -> Result<&mut Self, RouteError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: IntoFlow,
    {
        self.add_route(method, pattern, Handler::new(handler), Vec::new())
    }

    all_verb_methods!();

    /// Start a group of routes sharing `prefix` and `middleware`.
    pub fn group(&mut self, prefix: &str, middleware: Vec<Middleware>) -> RouterGroup<'_> {
        RouterGroup::new(self, prefix.to_string(), middleware)
    }

    /// Handle requests no route matches. The handler is wrapped in the
    /// global middleware registered so far.
    pub fn not_found<F, Fut, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: IntoFlow,
    {
        self.not_found_handler(Handler::new(handler))
    }

    pub fn not_found_handler(&mut self, handler: Handler) -> &mut Self {
        self.not_found = Some(compose(&self.middleware, handler));
        self
    }

    /// Registered routes in match order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn compiler(&self) -> &PatternCompiler {
        &self.compiler
    }

    /// First route matching `method` and `path`, with its params.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(&Route, Params)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(method, path).map(|params| (route, params)))
    }

    /// Dispatch one request through the matching route.
    pub async fn serve(&self, request: Request<Body>) -> Response<Body> {
        let method = request.method().clone();
        let path = match_path(request.uri().path(), self.compiler.strict_slash());
        let matched = path
            .as_deref()
            .and_then(|path| self.match_route(&method, path));

        let (handler, params) = match matched {
            Some((route, params)) => {
                let chain = self.middleware.iter().chain(route.middleware());
                (compose(chain, route.handler().clone()), params)
            }
            None => match &self.not_found {
                Some(handler) => (handler.clone(), Params::new()),
                None => {
                    tracing::debug!(
                        method = %method,
                        path = request.uri().path(),
                        "No route matched"
                    );
                    return response::not_found();
                }
            },
        };

        let span = tracing::info_span!(
            "request",
            method = %method,
            path = %request.uri().path(),
            request_id = tracing::field::Empty,
        );
        let ctx = Context::new(request, params, self.settings.clone(), span.clone());
        handler.call(ctx.clone()).instrument(span).await;
        ctx.take_response()
    }

    pub(crate) fn push_route(
        &mut self,
        method: Method,
        pattern: CompiledPattern,
        handler: Handler,
        middleware: Vec<Middleware>,
    ) -> &mut Self {
        tracing::debug!(
            method = %method,
            pattern = pattern.template(),
            regex = pattern.as_str(),
            "Route registered"
        );
        self.routes.push(Route::new(method, pattern, handler, middleware));
        self
    }
}

/// The percent-decoded request path routes are matched against, with the
/// strict-slash suffix applied. `None` when the decoded bytes are not UTF-8.
fn match_path(raw: &str, strict_slash: bool) -> Option<String> {
    let mut path = urlencoding::decode(raw).ok()?.into_owned();
    if strict_slash && !path.ends_with('/') {
        path.push('/');
    }
    Some(path)
}

impl Default for Router {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}
