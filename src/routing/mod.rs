//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (registration phase, &mut Router):
//!     "/users/{id:int}"
//!     → pattern.rs (template → anchored regex with named groups)
//!     → route.rs (method + pattern + handler + route middleware)
//!     → appended to the route table in registration order
//!
//! Incoming Request (serving phase, Arc<Router>):
//!     → router.rs (linear scan, first method + path match wins)
//!     → compose(global ++ route middleware, handler)
//!     → Context with extracted params
//!     → Return: response from the context sink, or 404
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable while serving
//! - Deterministic: same input always matches same route
//! - First match wins (registration order, no specificity ranking)
//! - Malformed templates are rejected at registration with a `RouteError`

/// Generates the per-verb registration helpers shared by [`Router`] and
/// [`RouterGroup`]. Both types provide `add_route`.
macro_rules! verb_methods {
    ($($name:ident, $name_with:ident => $method:ident;)*) => {
        $(
            #[doc = concat!("Register a `", stringify!($method), "` route.")]
            pub fn $name<F, Fut, R>(
                &mut self,
                pattern: &str,
                handler: F,
            ) -> Result<&mut Self, $crate::routing::RouteError>
            where
                F: Fn($crate::http::Context) -> Fut + Send + Sync + 'static,
                Fut: ::std::future::Future<Output = R> + Send + 'static,
                R: $crate::http::IntoFlow,
            {
                self.add_route(
                    ::axum::http::Method::$method,
                    pattern,
                    $crate::http::Handler::new(handler),
                    Vec::new(),
                )
            }

            #[doc = concat!(
                "Register a `",
                stringify!($method),
                "` route with route-local middleware."
            )]
            pub fn $name_with<F, Fut, R>(
                &mut self,
                pattern: &str,
                middleware: Vec<$crate::http::Middleware>,
                handler: F,
            ) -> Result<&mut Self, $crate::routing::RouteError>
            where
                F: Fn($crate::http::Context) -> Fut + Send + Sync + 'static,
                Fut: ::std::future::Future<Output = R> + Send + 'static,
                R: $crate::http::IntoFlow,
            {
                self.add_route(
                    ::axum::http::Method::$method,
                    pattern,
                    $crate::http::Handler::new(handler),
                    middleware,
                )
            }
        )*
    };
}

macro_rules! all_verb_methods {
    () => {
        verb_methods! {
            get, get_with => GET;
            post, post_with => POST;
            put, put_with => PUT;
            patch, patch_with => PATCH;
            delete, delete_with => DELETE;
            options, options_with => OPTIONS;
            connect, connect_with => CONNECT;
            trace, trace_with => TRACE;
            head, head_with => HEAD;
        }
    };
}

pub mod group;
pub mod pattern;
pub mod route;
pub mod router;

pub use group::RouterGroup;
pub use pattern::{CompiledPattern, ParamType, Params, PatternCompiler, RouteError};
pub use route::Route;
pub use router::Router;
