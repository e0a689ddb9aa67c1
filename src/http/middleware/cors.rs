//! CORS middleware.

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::{from_fn, Middleware, Next};
use crate::http::context::Context;
use crate::http::handler::Flow;

/// Values copied into the CORS response headers as given.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the server. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    /// How long a preflight result may be cached.
    #[serde(with = "secs")]
    pub max_age: Duration,
}

impl CorsConfig {
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }
}

/// Reject requests without an allowed `Origin` (403), answer preflight
/// `OPTIONS` requests directly and decorate everything else.
pub fn cors(config: CorsConfig) -> Middleware {
    let methods = config.allowed_methods.join(",");
    let headers = config.allowed_headers.join(",");
    let expose = config.expose_headers.join(",");
    let max_age = config.max_age.as_secs().to_string();

    from_fn(move |ctx: Context, next: Next| {
        let origin = ctx.header_value(header::ORIGIN.as_str()).map(str::to_string);
        let allowed = origin
            .as_deref()
            .is_some_and(|origin| config.is_origin_allowed(origin));
        if allowed {
            if let Some(origin) = &origin {
                ctx.header(header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), origin)
                    .header(header::ACCESS_CONTROL_ALLOW_METHODS.as_str(), &methods)
                    .header(header::ACCESS_CONTROL_ALLOW_HEADERS.as_str(), &headers)
                    .header(header::ACCESS_CONTROL_EXPOSE_HEADERS.as_str(), &expose)
                    .header(header::ACCESS_CONTROL_MAX_AGE.as_str(), &max_age);
                if config.allow_credentials {
                    ctx.header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str(), "true");
                }
            }
        }
        let preflight = ctx.method() == Method::OPTIONS;

        async move {
            if !allowed {
                tracing::debug!(origin = ?origin, "CORS origin rejected");
                return ctx.abort(StatusCode::FORBIDDEN, "Forbidden");
            }
            if preflight {
                ctx.status(StatusCode::OK);
                return Flow::Completed;
            }
            next.run(ctx).await
        }
    })
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::RequestSettings;
    use crate::http::handler::Handler;
    use crate::http::middleware::compose;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tracing::Span;

    fn config() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec!["https://app.example.com".into()],
            allowed_methods: vec!["GET".into(), "POST".into()],
            allowed_headers: vec!["Content-Type".into()],
            expose_headers: vec!["X-Request-Id".into()],
            allow_credentials: true,
            max_age: Duration::from_secs(600),
        }
    }

    async fn run(method: Method, origin: Option<&str>) -> (Flow, Context, bool) {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        let ctx = Context::new(
            builder.body(Body::empty()).unwrap(),
            Default::default(),
            Arc::new(RequestSettings::default()),
            Span::none(),
        );
        let reached = Arc::new(AtomicBool::new(false));
        let flag = reached.clone();
        let handler = Handler::new(move |_ctx: Context| {
            let flag = flag.clone();
            async move { flag.store(true, Ordering::SeqCst) }
        });
        let flow = compose(&[cors(config())], handler).call(ctx.clone()).await;
        (flow, ctx, reached.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_missing_or_unknown_origin_is_forbidden() {
        let (flow, ctx, reached) = run(Method::GET, None).await;
        assert_eq!(flow, Flow::Aborted);
        assert_eq!(ctx.status_code(), StatusCode::FORBIDDEN);
        assert!(!reached);

        let (_, ctx, reached) = run(Method::GET, Some("https://evil.example")).await;
        assert_eq!(ctx.status_code(), StatusCode::FORBIDDEN);
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_allowed_origin_gets_headers() {
        let (flow, ctx, reached) = run(Method::GET, Some("https://app.example.com")).await;
        assert_eq!(flow, Flow::Completed);
        assert!(reached);
        let response = ctx.take_response();
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET,POST");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "600");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let (flow, ctx, reached) = run(Method::OPTIONS, Some("https://app.example.com")).await;
        assert_eq!(flow, Flow::Completed);
        assert!(!reached);
        assert_eq!(ctx.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_wildcard_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["*".into()],
            ..CorsConfig::default()
        };
        assert!(config.is_origin_allowed("https://anything.test"));
    }
}
