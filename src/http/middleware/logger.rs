//! Request logging middleware.

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::header;

use super::{from_fn, Middleware, Next};
use crate::http::context::Context;
use crate::observability::metrics;

/// Log one line per request after the chain returns and record request
/// metrics.
pub fn logger() -> Middleware {
    from_fn(|ctx: Context, next: Next| async move {
        let start = Instant::now();
        let flow = next.run(ctx.clone()).await;
        let status = ctx.status_code();

        tracing::info!(
            method = %ctx.method(),
            path = ctx.path(),
            status = status.as_u16(),
            ip = %client_ip(ctx.remote_addr()),
            user_agent = ctx.header_value(header::USER_AGENT.as_str()).unwrap_or("-"),
            latency = ?start.elapsed(),
            aborted = flow.is_aborted(),
            "Request completed"
        );
        metrics::record_request(ctx.method().as_str(), status.as_u16(), start);
        flow
    })
}

/// Peer IP for logs; loopback peers are shown as `localhost`.
fn client_ip(addr: Option<SocketAddr>) -> String {
    match addr {
        Some(addr) if addr.ip().is_loopback() => "localhost".to_string(),
        Some(addr) => addr.ip().to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::RequestSettings;
    use crate::http::handler::{Flow, Handler};
    use crate::http::middleware::compose;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tracing::Span;

    #[test]
    fn test_client_ip() {
        assert_eq!(client_ip(Some("127.0.0.1:4000".parse().unwrap())), "localhost");
        assert_eq!(client_ip(Some("[::1]:4000".parse().unwrap())), "localhost");
        assert_eq!(client_ip(Some("10.1.2.3:80".parse().unwrap())), "10.1.2.3");
        assert_eq!(client_ip(None), "-");
    }

    #[tokio::test]
    async fn test_logger_is_transparent() {
        let mut request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        let ctx = Context::new(
            request,
            Default::default(),
            Arc::new(RequestSettings::default()),
            Span::none(),
        );
        assert_eq!(ctx.remote_addr(), Some(peer));

        let handler = Handler::new(|ctx: Context| async move {
            ctx.abort(StatusCode::IM_A_TEAPOT, "teapot")
        });
        let flow = compose(&[logger()], handler).call(ctx.clone()).await;
        assert_eq!(flow, Flow::Aborted);
        assert_eq!(ctx.status_code(), StatusCode::IM_A_TEAPOT);
    }
}
