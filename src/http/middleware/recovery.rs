//! Panic recovery middleware.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use futures_util::FutureExt;

use super::{from_fn, Middleware, Next};
use crate::http::context::Context;

/// Catch panics from the inner chain and answer `500 Internal Server Error`.
///
/// The panic detail is logged, never sent to the client.
pub fn recovery() -> Middleware {
    from_fn(|ctx: Context, next: Next| async move {
        match AssertUnwindSafe(next.run(ctx.clone())).catch_unwind().await {
            Ok(flow) => flow,
            Err(payload) => {
                tracing::error!(
                    method = %ctx.method(),
                    path = ctx.path(),
                    panic = %panic_message(payload.as_ref()),
                    "Handler panicked"
                );
                ctx.abort(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
