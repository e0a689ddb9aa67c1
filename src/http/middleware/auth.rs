//! Bearer token authentication middleware.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;

use super::{from_fn, Middleware, Next};
use crate::auth::TokenIssuer;
use crate::http::context::Context;

/// Context key the authenticated user is stored under.
pub const USER_KEY: &str = "user";

/// Require a valid bearer token and a loadable user.
///
/// The token subject is passed to `loader`; the user it returns is stored
/// under [`USER_KEY`]. No token or an invalid token aborts with 401, a
/// loader failure with 403.
pub fn login_required<L, Fut, U, E>(issuer: Arc<dyn TokenIssuer>, loader: L) -> Middleware
where
    L: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, E>> + Send + 'static,
    U: Send + Sync + 'static,
    E: fmt::Display,
{
    let loader = Arc::new(loader);
    from_fn(move |ctx: Context, next: Next| {
        let issuer = issuer.clone();
        let loader = loader.clone();
        async move {
            let Some(token) = ctx.bearer_token() else {
                return ctx.abort(StatusCode::UNAUTHORIZED, "Unauthorized");
            };
            let subject = match issuer.verify(token) {
                Ok(subject) => subject,
                Err(err) => {
                    return ctx.abort(StatusCode::UNAUTHORIZED, format!("Unauthorized: {err}"));
                }
            };
            match (*loader)(subject).await {
                Ok(user) => ctx.set(USER_KEY, user),
                Err(err) => {
                    tracing::debug!(subject, error = %err, "User could not be loaded");
                    return ctx.abort(StatusCode::FORBIDDEN, "Forbidden: User not found!");
                }
            }
            next.run(ctx).await
        }
    })
}
