//! Handler type shared by routes, middleware and the not-found fallback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::context::Context;

/// Outcome of running a handler chain.
///
/// `Aborted` is returned by [`Context::abort`] so that an outer middleware can
/// see that an inner layer already answered the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Completed,
    Aborted,
}

impl Flow {
    pub fn is_aborted(self) -> bool {
        matches!(self, Flow::Aborted)
    }
}

/// Values a handler future may resolve to.
pub trait IntoFlow {
    fn into_flow(self) -> Flow;
}

impl IntoFlow for () {
    fn into_flow(self) -> Flow {
        Flow::Completed
    }
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Flow {
        self
    }
}

type BoxedHandler = dyn Fn(Context) -> BoxFuture<'static, Flow> + Send + Sync;

/// A type-erased async request handler. Cloning is cheap.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<BoxedHandler>,
}

impl Handler {
    /// Wrap an async function of the request context.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoFlow,
    {
        Self {
            inner: Arc::new(move |ctx| {
                let fut = f(ctx);
                Box::pin(async move { fut.await.into_flow() })
            }),
        }
    }

    /// Invoke the handler.
    pub fn call(&self, ctx: Context) -> BoxFuture<'static, Flow> {
        (self.inner)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}
