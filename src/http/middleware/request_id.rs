//! Request ID middleware.

use uuid::Uuid;

use super::{from_fn, Middleware, Next};
use crate::http::context::Context;

/// Header carrying the request ID, inbound and outbound.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID stored in the context under [`X_REQUEST_ID`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reuse the caller's `x-request-id` or generate a UUID v4, store it in the
/// context and echo it on the response.
pub fn request_id() -> Middleware {
    from_fn(|ctx: Context, next: Next| async move {
        let id = ctx
            .header_value(X_REQUEST_ID)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        ctx.span().record("request_id", id.as_str());
        ctx.header(X_REQUEST_ID, &id);
        ctx.set(X_REQUEST_ID, RequestId(id));
        next.run(ctx).await
    })
}
