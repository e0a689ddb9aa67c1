//! rexroute demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, timeout + trace layers)
//!                          │
//!                          ▼
//!                    routing::Router ── first method + regex match
//!                          │
//!                          ▼
//!          global middleware ▶ group middleware ▶ route middleware
//!                          │
//!                          ▼
//!                 handler(Context) ──▶ buffered response
//!
//!     GET /ws ──▶ websocket::HubHandle::upgrade ──▶ hub loop ──▶ every client
//! ```

use std::path::PathBuf;

use axum::http::{Method, StatusCode};
use clap::Parser;
use serde::Deserialize;

use rexroute::config::{load_config, ServerConfig};
use rexroute::http::middleware::request_id;
use rexroute::http::{Context, Flow, HttpServer, SpaConfig};
use rexroute::lifecycle::{shutdown_on_signal, Shutdown};
use rexroute::observability::init_logging;
use rexroute::observability::metrics::init_metrics;
use rexroute::routing::Router;
use rexroute::validation::{FieldType, Schema};
use rexroute::websocket::Hub;

#[derive(Parser, Debug)]
#[command(name = "rexroute", version, about = "Regex router demo server")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Serve a single-page app from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Echo {
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.logging)?;
    tracing::info!("rexroute v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        strict_slash = config.router.strict_slash,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let (hub, hub_handle) = Hub::with_shutdown(config.websocket.clone(), shutdown.clone());
    tokio::spawn(hub.run());

    let mut router = Router::with_defaults(&config.router);
    router.middleware(request_id());
    router.register_schema::<Echo>(Schema::new().required("message", FieldType::String));

    router
        .get("/health", |ctx: Context| async move {
            ctx.json(StatusCode::OK, &serde_json::json!({ "status": "ok" }));
        })?
        .get("/users/{id:int}", |ctx: Context| async move {
            match ctx.int_param("id") {
                Ok(id) => {
                    ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }));
                    Flow::Completed
                }
                Err(err) => ctx.abort(StatusCode::BAD_REQUEST, err.to_string()),
            }
        })?
        .add_route(Method::GET, "/ws", hub_handle.handler(), Vec::new())?;

    {
        let mut api = router.group("/api", Vec::new());
        api.get("/time", |ctx: Context| async move {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            ctx.json(StatusCode::OK, &serde_json::json!({ "unix": now }));
        })?;
        api.post("/echo", |ctx: Context| async move {
            match ctx.bind_json_validated::<Echo>().await {
                Ok(echo) => {
                    ctx.text(StatusCode::OK, echo.message);
                    Flow::Completed
                }
                Err(rexroute::http::BodyError::Invalid(errors)) => {
                    ctx.validation_error(&errors);
                    Flow::Aborted
                }
                Err(err) => ctx.abort(StatusCode::BAD_REQUEST, err.to_string()),
            }
        })?;
    }

    if let Some(dir) = cli.static_dir {
        tracing::info!(dir = %dir.display(), "Serving single-page app");
        router.spa(SpaConfig {
            dir,
            ignore_patterns: vec!["/api/".to_string()],
            ..SpaConfig::default()
        })?;
    }

    let server = HttpServer::new(router, config, shutdown.clone());
    server.serve().await?;

    hub_handle.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
