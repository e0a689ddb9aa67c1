//! Per-request context.
//!
//! # Responsibilities
//! - Carry the request head, the unread body and the extracted path params
//! - Own the buffered response sink for the request
//! - Provide a lock-guarded key/value store for middleware → handler data
//! - Track the advisory aborted flag
//! - Expose the validator registry for body binding
//!
//! # Design Decisions
//! - `Context` is a cheap `Arc` clone so a handler may fan out to tasks
//! - Path params are immutable after dispatch and need no lock
//! - Locks are never held across an `.await`
//! - Aborting writes the response and returns [`Flow::Aborted`]; it does
//!   not unwind the chain

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use axum::body::{Body, Bytes};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::Span;

use crate::http::handler::Flow;
use crate::http::response::ResponseWriter;
use crate::routing::Params;
use crate::validation::{FieldErrors, Validator};

/// Default cap on request bodies read through the context (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 << 20;

/// Router-wide settings every context shares.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    /// Upper bound for [`Context::body_bytes`].
    pub max_body_bytes: usize,
    /// Schemas used by [`Context::bind_json_validated`].
    pub validator: Validator,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            validator: Validator::default(),
        }
    }
}

/// Failure to read a path or query parameter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing parameter {0:?}")]
    Missing(String),

    #[error("invalid value {value:?} for parameter {name:?}")]
    Invalid { name: String, value: String },
}

/// Failure to read or bind the request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body already consumed")]
    Consumed,

    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    Invalid(FieldErrors),
}

type Store = HashMap<String, Arc<dyn Any + Send + Sync>>;

struct Inner {
    parts: Parts,
    body: Mutex<Option<Body>>,
    params: Params,
    response: Mutex<ResponseWriter>,
    data: RwLock<Store>,
    aborted: AtomicBool,
    settings: Arc<RequestSettings>,
    span: Span,
}

/// State threaded through the handler chain for one request.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Build a context for `request` with already extracted `params`.
    pub fn new(
        request: Request<Body>,
        params: Params,
        settings: Arc<RequestSettings>,
        span: Span,
    ) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            inner: Arc::new(Inner {
                parts,
                body: Mutex::new(Some(body)),
                params,
                response: Mutex::new(ResponseWriter::new()),
                data: RwLock::new(HashMap::new()),
                aborted: AtomicBool::new(false),
                settings,
                span,
            }),
        }
    }

    // ----- request -----

    pub fn request(&self) -> &Parts {
        &self.inner.parts
    }

    pub fn method(&self) -> &Method {
        &self.inner.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.parts.uri
    }

    /// The raw, still percent-encoded request path.
    pub fn path(&self) -> &str {
        self.inner.parts.uri.path()
    }

    /// The percent-decoded request path, as routes are matched against it.
    /// `None` when the decoded bytes are not UTF-8.
    pub fn decoded_path(&self) -> Option<Cow<'_, str>> {
        urlencoding::decode(self.path()).ok()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.parts.headers
    }

    /// A request header as UTF-8, if present and valid.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.inner.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Peer address, when the server was started with connect info.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner
            .parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header_value(header::AUTHORIZATION.as_str())?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme != "Bearer" {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// The span every log line of this request is recorded under.
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    pub fn validator(&self) -> &Validator {
        &self.inner.settings.validator
    }

    // ----- path and query parameters -----

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    /// Parse a path parameter into any `FromStr` type.
    pub fn param_as<T: FromStr>(&self, name: &str) -> Result<T, ParamError> {
        let value = self
            .param(name)
            .ok_or_else(|| ParamError::Missing(name.to_string()))?;
        parse_value(name, value)
    }

    pub fn int_param(&self, name: &str) -> Result<i64, ParamError> {
        self.param_as(name)
    }

    pub fn uint_param(&self, name: &str) -> Result<u64, ParamError> {
        self.param_as(name)
    }

    pub fn float_param(&self, name: &str) -> Result<f64, ParamError> {
        self.param_as(name)
    }

    pub fn bool_param(&self, name: &str) -> Result<bool, ParamError> {
        self.param_as(name)
    }

    /// All query parameters; the last value wins for repeated keys.
    pub fn queries(&self) -> HashMap<String, String> {
        Query::<HashMap<String, String>>::try_from_uri(&self.inner.parts.uri)
            .map(|Query(map)| map)
            .unwrap_or_default()
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.queries().remove(key)
    }

    pub fn int_query(&self, key: &str) -> Result<i64, ParamError> {
        let value = self
            .query(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))?;
        parse_value(key, &value)
    }

    pub fn uint_query(&self, key: &str) -> Result<u64, ParamError> {
        let value = self
            .query(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))?;
        parse_value(key, &value)
    }

    // ----- key/value store -----

    /// Store a value for later middleware or handlers.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        let mut data = self.inner.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(key.into(), Arc::new(value));
    }

    /// Fetch a clone of a stored value. `None` when the key is missing or
    /// holds a different type.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let data = self.inner.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(key)?.downcast_ref::<T>().cloned()
    }

    /// Fetch a stored value that an earlier middleware is known to set.
    ///
    /// # Panics
    ///
    /// Panics if the key is missing or holds another type. This is a wiring
    /// mistake in the handler chain, not a runtime condition.
    pub fn must_get<T: Clone + 'static>(&self, key: &str) -> T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("value for key {key} not found in the context"),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let data = self.inner.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut data = self.inner.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(key).is_some()
    }

    // ----- body -----

    /// Read the whole body. The body can be taken once.
    pub async fn body_bytes(&self) -> Result<Bytes, BodyError> {
        let body = lock(&self.inner.body).take().ok_or(BodyError::Consumed)?;
        axum::body::to_bytes(body, self.inner.settings.max_body_bytes)
            .await
            .map_err(BodyError::Read)
    }

    /// Deserialize the JSON body.
    pub async fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let bytes = self.body_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Deserialize the JSON body after checking it against the schema
    /// registered for `T`.
    pub async fn bind_json_validated<T: DeserializeOwned + 'static>(&self) -> Result<T, BodyError> {
        let bytes = self.body_bytes().await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        self.validate::<T>(&value).map_err(BodyError::Invalid)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn validate<T: 'static>(&self, value: &Value) -> Result<(), FieldErrors> {
        self.inner.settings.validator.validate::<T>(value)
    }

    /// Answer 400 with the field → message map.
    pub fn validation_error(&self, errors: &FieldErrors) {
        self.json(StatusCode::BAD_REQUEST, errors);
    }

    // ----- response -----

    /// Run `f` with the response sink locked.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut ResponseWriter) -> R) -> R {
        f(&mut lock(&self.inner.response))
    }

    /// Write the status code. Ignored if one was already written.
    pub fn status(&self, status: StatusCode) -> &Self {
        lock(&self.inner.response).write_header(status);
        self
    }

    /// The status written so far (200 when nothing was written).
    pub fn status_code(&self) -> StatusCode {
        lock(&self.inner.response).status()
    }

    /// Set a response header. Invalid names or values are logged and skipped.
    pub fn header(&self, name: &str, value: &str) -> &Self {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                lock(&self.inner.response).headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = name, "Invalid response header skipped"),
        }
        self
    }

    pub fn write(&self, data: impl AsRef<[u8]>) {
        lock(&self.inner.response).write(data.as_ref());
    }

    pub fn text(&self, status: StatusCode, text: impl AsRef<str>) {
        self.write_typed(status, "text/plain; charset=utf-8", text.as_ref().as_bytes());
    }

    pub fn html(&self, status: StatusCode, html: impl AsRef<str>) {
        self.write_typed(status, "text/html; charset=utf-8", html.as_ref().as_bytes());
    }

    pub fn binary(&self, status: StatusCode, data: impl AsRef<[u8]>) {
        self.write_typed(status, "application/octet-stream", data.as_ref());
    }

    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.write_typed(status, "application/json", &bytes),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize JSON response");
                self.status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Permanent redirect to `location`.
    pub fn redirect(&self, location: &str) {
        self.redirect_with(StatusCode::MOVED_PERMANENTLY, location);
    }

    pub fn redirect_with(&self, status: StatusCode, location: &str) {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut response = lock(&self.inner.response);
                response.headers_mut().insert(header::LOCATION, value);
                response.write_header(status);
            }
            Err(_) => {
                tracing::error!(location, "Invalid redirect location");
                self.status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Serve a file from disk (404 when it does not exist).
    pub async fn file(&self, path: impl AsRef<Path>) {
        let request = self.request_head();
        match ServeFile::new(path).oneshot(request).await {
            Ok(response) => self.respond(response.map(Body::new)),
            Err(never) => match never {},
        }
    }

    /// Answer with a prebuilt response.
    pub fn respond(&self, response: Response<Body>) {
        lock(&self.inner.response).replace(response);
    }

    /// Write `status` and `message`, mark the request aborted.
    pub fn abort(&self, status: StatusCode, message: impl AsRef<str>) -> Flow {
        {
            let mut response = lock(&self.inner.response);
            response.write_header(status);
            response.write(message.as_ref().as_bytes());
        }
        self.inner.aborted.store(true, Ordering::SeqCst);
        Flow::Aborted
    }

    pub fn abort_with_error(&self, status: StatusCode, err: &dyn fmt::Display) -> Flow {
        self.abort(status, err.to_string())
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Extract a WebSocket upgrade from the request.
    pub async fn websocket_upgrade(&self) -> Result<WebSocketUpgrade, WebSocketUpgradeRejection> {
        let (mut parts, _) = self.request_head().into_parts();
        <WebSocketUpgrade as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await
    }

    /// Drain the sink into the final response.
    pub(crate) fn take_response(&self) -> Response<Body> {
        std::mem::take(&mut *lock(&self.inner.response)).into_response()
    }

    fn write_typed(&self, status: StatusCode, content_type: &'static str, body: &[u8]) {
        let mut response = lock(&self.inner.response);
        response.write_header(status);
        response
            .headers_mut()
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type));
        response.write(body);
    }

    /// Copy of the request head with an empty body.
    pub(crate) fn request_head(&self) -> Request<Body> {
        let parts = &self.inner.parts;
        let mut request = Request::new(Body::empty());
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = parts.uri.clone();
        *request.version_mut() = parts.version;
        *request.headers_mut() = parts.headers.clone();
        *request.extensions_mut() = parts.extensions.clone();
        request
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("path", &self.path())
            .field("params", self.params())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ParamError> {
    value.parse().map_err(|_| ParamError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{FieldType, Schema};
    use serde::Deserialize;

    fn context(request: Request<Body>, params: &[(&str, &str)]) -> Context {
        let params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Context::new(request, params, Arc::new(RequestSettings::default()), Span::none())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_store_roundtrip_and_types() {
        let ctx = context(get("/"), &[]);
        ctx.set("user", String::from("ann"));
        ctx.set("count", 3u32);

        assert_eq!(ctx.get::<String>("user").as_deref(), Some("ann"));
        assert_eq!(ctx.get::<u32>("count"), Some(3));
        assert_eq!(ctx.get::<u64>("count"), None);
        assert_eq!(ctx.get::<String>("missing"), None);
        assert!(ctx.contains("user"));
        assert!(ctx.remove("user"));
        assert!(!ctx.contains("user"));
    }

    #[test]
    #[should_panic(expected = "value for key user not found in the context")]
    fn test_must_get_panics_when_missing() {
        let ctx = context(get("/"), &[]);
        let _: String = ctx.must_get("user");
    }

    #[tokio::test]
    async fn test_store_is_shared_across_tasks() {
        let ctx = context(get("/"), &[]);
        let mut tasks = Vec::new();
        for i in 0..16u32 {
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                ctx.set(format!("k{i}"), i);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        for i in 0..16u32 {
            assert_eq!(ctx.get::<u32>(&format!("k{i}")), Some(i));
        }
    }

    #[test]
    fn test_typed_params() {
        let ctx = context(
            get("/"),
            &[("id", "42"), ("ratio", "1.5"), ("flag", "true"), ("bad", "x")],
        );
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.int_param("id"), Ok(42));
        assert_eq!(ctx.uint_param("id"), Ok(42));
        assert_eq!(ctx.float_param("ratio"), Ok(1.5));
        assert_eq!(ctx.bool_param("flag"), Ok(true));
        assert_eq!(ctx.int_param("missing"), Err(ParamError::Missing("missing".into())));
        assert_eq!(
            ctx.int_param("bad"),
            Err(ParamError::Invalid {
                name: "bad".into(),
                value: "x".into()
            })
        );
    }

    #[test]
    fn test_query_helpers() {
        let ctx = context(get("/search?q=rust%20lang&page=2&page=3&n=abc"), &[]);
        assert_eq!(ctx.query("q").as_deref(), Some("rust lang"));
        assert_eq!(ctx.query("missing"), None);
        assert!(ctx.int_query("n").is_err());
        assert!(ctx.uint_query("page").is_ok());
    }

    #[test]
    fn test_decoded_path() {
        let ctx = context(get("/at/2024-01-31%2010:20:30"), &[]);
        assert_eq!(ctx.path(), "/at/2024-01-31%2010:20:30");
        assert_eq!(ctx.decoded_path().as_deref(), Some("/at/2024-01-31 10:20:30"));

        let ctx = context(get("/caf%C3%A9"), &[]);
        assert_eq!(ctx.decoded_path().as_deref(), Some("/café"));

        assert_eq!(context(get("/bad%FF"), &[]).decoded_path(), None);
    }

    #[test]
    fn test_bearer_token() {
        let request = Request::builder()
            .uri("/")
            .header("Authorization", "Bearer abc.def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(context(request, &[]).bearer_token(), Some("abc.def"));

        let basic = Request::builder()
            .uri("/")
            .header("Authorization", "Basic Zm9v")
            .body(Body::empty())
            .unwrap();
        assert_eq!(context(basic, &[]).bearer_token(), None);
        assert_eq!(context(get("/"), &[]).bearer_token(), None);
    }

    #[test]
    fn test_abort_marks_context_and_keeps_first_status() {
        let ctx = context(get("/"), &[]);
        assert!(!ctx.is_aborted());
        let flow = ctx.abort(StatusCode::UNAUTHORIZED, "Unauthorized");
        assert_eq!(flow, Flow::Aborted);
        assert!(ctx.is_aborted());

        ctx.text(StatusCode::OK, "late write");
        assert_eq!(ctx.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.take_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_json_response() {
        let ctx = context(get("/"), &[]);
        ctx.json(StatusCode::CREATED, &serde_json::json!({"ok": true}));
        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[test]
    fn test_redirect_sets_location() {
        let ctx = context(get("/old"), &[]);
        ctx.redirect("/new");
        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/new");
    }

    #[derive(Debug, Deserialize)]
    struct Signup {
        email: String,
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_json_validated() {
        let mut settings = RequestSettings::default();
        settings
            .validator
            .register::<Signup>(Schema::new().required("email", FieldType::Email));
        let settings = Arc::new(settings);

        let ok = Context::new(
            post_json(r#"{"email":"a@b.io"}"#),
            Params::new(),
            settings.clone(),
            Span::none(),
        );
        let signup: Signup = ok.bind_json_validated().await.unwrap();
        assert_eq!(signup.email, "a@b.io");

        let bad = Context::new(
            post_json(r#"{"email":"nope"}"#),
            Params::new(),
            settings,
            Span::none(),
        );
        match bad.bind_json_validated::<Signup>().await {
            Err(BodyError::Invalid(errors)) => {
                assert_eq!(errors.get("email"), Some("email must be a valid email address"))
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_can_be_read_once() {
        let ctx = context(post_json("{}"), &[]);
        assert!(ctx.body_bytes().await.is_ok());
        assert!(matches!(ctx.body_bytes().await, Err(BodyError::Consumed)));
    }

    #[tokio::test]
    async fn test_body_limit_is_enforced() {
        let settings = Arc::new(RequestSettings {
            max_body_bytes: 4,
            ..RequestSettings::default()
        });
        let ctx = Context::new(
            post_json(r#"{"too":"long"}"#),
            Params::new(),
            settings,
            Span::none(),
        );
        assert!(matches!(ctx.body_bytes().await, Err(BodyError::Read(_))));
    }

    #[tokio::test]
    async fn test_upgrade_rejected_for_plain_request() {
        let ctx = context(get("/ws"), &[]);
        assert!(ctx.websocket_upgrade().await.is_err());
    }
}
