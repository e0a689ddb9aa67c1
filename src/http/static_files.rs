//! Static directories and single-page-app hosting.
//!
//! # Responsibilities
//! - Mount a directory under a path prefix (`Router::static_dir`)
//! - Serve a built front-end with client-side routing (`Router::spa`)
//!
//! # Design Decisions
//! - Files come from a real directory at request time, nothing is embedded
//! - Paths are percent-decoded, then any with `..` segments are refused
//!   before touching the disk
//! - The SPA handler doubles as the not-found handler

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::{Context, Flow, Handler};
use crate::routing::{RouteError, Router};

/// Settings for [`Router::spa`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpaConfig {
    /// Route the app is mounted on.
    pub route: String,
    /// Build output directory.
    pub dir: PathBuf,
    /// Document served for client-side routes.
    pub index_file: String,
    /// Paths containing any of these substrings are answered with 404.
    pub ignore_patterns: Vec<String>,
}

impl Default for SpaConfig {
    fn default() -> Self {
        Self {
            route: "/".to_string(),
            dir: PathBuf::from("build"),
            index_file: "index.html".to_string(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl Router {
    /// Serve files from `dir` for every `GET` under `root`. `strip_prefix`
    /// is removed from the request path before it is resolved in `dir`.
    pub fn static_dir(
        &mut self,
        root: &str,
        dir: impl AsRef<Path>,
        strip_prefix: &str,
    ) -> Result<&mut Self, RouteError> {
        let pattern = self.compiler().prefix(root)?;
        let service = ServeDir::new(dir.as_ref());
        let strip = strip_prefix.to_string();

        let handler = Handler::new(move |ctx: Context| {
            let service = service.clone();
            let strip = strip.clone();
            async move {
                let path = ctx.path().strip_prefix(strip.as_str()).unwrap_or(ctx.path());
                let mut target = if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{path}")
                };
                if let Some(query) = ctx.uri().query() {
                    target.push('?');
                    target.push_str(query);
                }
                let Ok(uri) = target.parse::<Uri>() else {
                    return ctx.abort(StatusCode::BAD_REQUEST, "Bad Request");
                };

                let mut request = ctx.request_head();
                *request.uri_mut() = uri;
                match service.oneshot(request).await {
                    Ok(response) => ctx.respond(response.map(Body::new)),
                    Err(never) => match never {},
                }
                Flow::Completed
            }
        });
        Ok(self.push_route(Method::GET, pattern, handler, Vec::new()))
    }

    /// Host a single-page app from `config.dir`.
    ///
    /// Existing files are served as-is. A missing path with an extension is
    /// a 404; any other missing path gets the index document so the
    /// client-side router can handle it.
    pub fn spa(&mut self, config: SpaConfig) -> Result<&mut Self, RouteError> {
        let pattern = self.compiler().compile(&config.route)?;
        let handler = spa_handler(config);
        self.not_found_handler(handler.clone());
        Ok(self.push_route(Method::GET, pattern, handler, Vec::new()))
    }
}

fn spa_handler(config: SpaConfig) -> Handler {
    let dir = config.dir;
    let index = dir.join(&config.index_file);
    let ignore: Arc<[String]> = config.ignore_patterns.into();

    Handler::new(move |ctx: Context| {
        let dir = dir.clone();
        let index = index.clone();
        let ignore = ignore.clone();
        async move {
            let Some(path) = ctx.decoded_path().map(|path| path.into_owned()) else {
                return ctx.abort(StatusCode::NOT_FOUND, "Not Found");
            };
            let path = path.as_str();
            let ignored = ignore.iter().any(|pattern| path.contains(pattern.as_str()));
            if ignored || has_parent_segment(path) {
                return ctx.abort(StatusCode::NOT_FOUND, "Not Found");
            }

            let target = dir.join(path.trim_start_matches('/'));
            match tokio::fs::metadata(&target).await {
                Ok(meta) if meta.is_dir() => ctx.file(target.join(index_name(&index))).await,
                Ok(_) => ctx.file(&target).await,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    if Path::new(path).extension().is_some() {
                        ctx.status(StatusCode::NOT_FOUND);
                    } else {
                        ctx.file(&index).await;
                    }
                }
                Err(err) => {
                    tracing::error!(path, error = %err, "Failed to stat file");
                    return ctx.abort(StatusCode::INTERNAL_SERVER_ERROR, "something went wrong");
                }
            }
            Flow::Completed
        }
    })
}

fn index_name(index: &Path) -> &Path {
    index.file_name().map(Path::new).unwrap_or(index)
}

fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "..")
}
