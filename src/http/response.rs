//! Buffered response sink.
//!
//! # Responsibilities
//! - Record the status code actually written (first write wins)
//! - Collect headers and body bytes until the handler chain returns
//! - Accept a prebuilt response (file, websocket upgrade) in place of the body
//!
//! # Design Decisions
//! - Later status writes are ignored, so a handler that ignores an abort
//!   cannot corrupt the status already chosen
//! - Headers set on the sink are merged into a prebuilt response without
//!   overwriting the ones it already carries

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};

/// Collects what the handler chain writes for one request.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    replacement: Option<Response<Body>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status code. Returns `false` when a status was already
    /// written, in which case nothing changes.
    pub fn write_header(&mut self, status: StatusCode) -> bool {
        if let Some(existing) = self.status {
            tracing::debug!(
                existing = existing.as_u16(),
                ignored = status.as_u16(),
                "Superfluous status write ignored"
            );
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Whether a status has been written.
    pub fn is_written(&self) -> bool {
        self.status.is_some()
    }

    /// The recorded status, or 200 if nothing was written yet.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append body bytes. Implies a 200 status if none was written.
    pub fn write(&mut self, data: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
    }

    /// Buffered body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Use a prebuilt response instead of the buffered body.
    pub fn replace(&mut self, response: Response<Body>) {
        self.write_header(response.status());
        self.body.clear();
        self.replacement = Some(response);
    }

    /// Build the final HTTP response.
    pub fn into_response(self) -> Response<Body> {
        let status = self.status();
        match self.replacement {
            Some(mut response) => {
                *response.status_mut() = status;
                for name in self.headers.keys() {
                    if response.headers().contains_key(name) {
                        continue;
                    }
                    for value in self.headers.get_all(name) {
                        response.headers_mut().append(name.clone(), value.clone());
                    }
                }
                response
            }
            None => {
                let mut response = Response::new(Body::from(self.body));
                *response.status_mut() = status;
                *response.headers_mut() = self.headers;
                response
            }
        }
    }
}

/// Plain `404 page not found` response used when nothing matches.
pub fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("404 page not found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_status_write_wins() {
        let mut writer = ResponseWriter::new();
        assert!(writer.write_header(StatusCode::UNAUTHORIZED));
        assert!(!writer.write_header(StatusCode::OK));
        assert_eq!(writer.status(), StatusCode::UNAUTHORIZED);

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_write_implies_ok() {
        let mut writer = ResponseWriter::new();
        assert!(!writer.is_written());
        writer.write(b"hello ");
        writer.write(b"world");
        assert_eq!(writer.status(), StatusCode::OK);
        assert_eq!(writer.body(), b"hello world");
        assert!(!writer.write_header(StatusCode::CREATED));
    }

    #[test]
    fn test_replacement_keeps_sink_headers_without_overwriting() {
        let mut writer = ResponseWriter::new();
        writer
            .headers_mut()
            .insert("x-trace", HeaderValue::from_static("abc"));
        writer
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let mut prebuilt = Response::new(Body::from("<p>hi</p>"));
        *prebuilt.status_mut() = StatusCode::ACCEPTED;
        prebuilt
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        writer.replace(prebuilt);

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-trace"], "abc");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[test]
    fn test_replacement_after_status_keeps_first_status() {
        let mut writer = ResponseWriter::new();
        writer.write_header(StatusCode::NOT_FOUND);
        writer.replace(Response::new(Body::empty()));
        assert_eq!(writer.into_response().status(), StatusCode::NOT_FOUND);
    }
}
