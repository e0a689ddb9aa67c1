//! Middleware chaining.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     Router::middleware(m1), Router::middleware(m2), route-local m3
//!
//! Per request:
//!     compose([m1, m2, m3], handler)
//!     → m1(m2(m3(handler)))
//!     → m1 runs first, may call next or abort
//! ```
//!
//! # Design Decisions
//! - A middleware is a function from handler to handler
//! - The first registered middleware is the outermost layer
//! - Aborting is a returned [`Flow::Aborted`], never a panic

pub mod auth;
pub mod cors;
pub mod logger;
pub mod recovery;
pub mod request_id;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::http::context::Context;
use crate::http::handler::{Flow, Handler, IntoFlow};

pub use auth::{login_required, USER_KEY};
pub use cors::{cors, CorsConfig};
pub use logger::logger;
pub use recovery::recovery;
pub use request_id::{request_id, RequestId, X_REQUEST_ID};

type Wrap = dyn Fn(Handler) -> Handler + Send + Sync;

/// Wraps a handler to produce a new handler.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<Wrap>,
}

impl Middleware {
    /// Build a middleware from a handler transformer.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    pub fn wrap(&self, next: Handler) -> Handler {
        (self.wrap)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// The remainder of the chain, handed to a [`from_fn`] middleware.
#[derive(Clone, Debug)]
pub struct Next {
    handler: Handler,
}

impl Next {
    /// Run the inner handler.
    pub async fn run(self, ctx: Context) -> Flow {
        self.handler.call(ctx).await
    }
}

/// Build a middleware from an async function of the context and the rest of
/// the chain. Returning without calling `next.run` short-circuits.
pub fn from_fn<F, Fut, R>(f: F) -> Middleware
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoFlow,
{
    let f = Arc::new(f);
    Middleware::new(move |handler| {
        let f = f.clone();
        Handler::new(move |ctx| {
            let next = Next {
                handler: handler.clone(),
            };
            (*f)(ctx, next)
        })
    })
}

/// Fold `middleware` around `handler` so the first element runs first.
pub fn compose<'a, I>(middleware: I, handler: Handler) -> Handler
where
    I: IntoIterator<Item = &'a Middleware>,
    I::IntoIter: DoubleEndedIterator,
{
    middleware
        .into_iter()
        .rev()
        .fold(handler, |next, m| m.wrap(next))
}
