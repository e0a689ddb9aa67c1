//! HTTP server setup.
//!
//! # Responsibilities
//! - Mount the [`Router`] as the fallback of an Axum app
//! - Wire up the outer layers (request timeout, HTTP tracing)
//! - Serve plain TCP or TLS until the shared [`Shutdown`] fires
//! - Bound the drain of in-flight requests by the configured grace period

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ServerConfig, TlsConfig};
use crate::lifecycle::Shutdown;
use crate::routing::Router;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address {address}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// HTTP front end for a [`Router`].
pub struct HttpServer {
    app: axum::Router,
    config: ServerConfig,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(router: impl Into<Arc<Router>>, config: ServerConfig, shutdown: Shutdown) -> Self {
        let app = Self::build_app(router.into(), &config);
        Self {
            app,
            config,
            shutdown,
        }
    }

    #[allow(deprecated)]
    fn build_app(router: Arc<Router>, config: &ServerConfig) -> axum::Router {
        axum::Router::new()
            .fallback(move |request: Request<Body>| {
                let router = router.clone();
                async move { router.serve(request).await }
            })
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(TraceLayer::new_for_http())
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await
        });

        tokio::select! {
            result = &mut server => return flatten(result),
            _ = self.shutdown.wait() => {}
        }

        let grace = self.config.timeouts.shutdown_grace();
        tracing::info!(grace = ?grace, "Draining in-flight requests");
        match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => flatten(result)?,
            Err(_) => {
                tracing::warn!("Grace period elapsed, dropping remaining connections");
                server.abort();
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Bind the configured address and serve, over TLS when configured.
    pub async fn serve(self) -> Result<(), ServerError> {
        let address = self.config.listener.bind_address.clone();
        match self.config.listener.tls.clone() {
            Some(tls) => {
                let addr = address
                    .parse()
                    .map_err(|source| ServerError::Address { address, source })?;
                self.run_tls(addr, &tls).await
            }
            None => {
                let listener = TcpListener::bind(&address).await?;
                self.run(listener).await
            }
        }
    }

    /// Serve HTTPS on `addr` until shutdown.
    pub async fn run_tls(self, addr: SocketAddr, tls: &TlsConfig) -> Result<(), ServerError> {
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let grace = self.config.timeouts.shutdown_grace();
        let shutdown = self.shutdown.clone();
        let watcher = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            watcher.graceful_shutdown(Some(grace));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ServerError> {
    for path in [cert_path, key_path] {
        if !path.exists() {
            return Err(ServerError::Tls(format!("file not found: {}", path.display())));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| ServerError::Tls(e.to_string()))
}

fn flatten(result: Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    match result {
        Ok(inner) => Ok(inner?),
        Err(err) => Err(ServerError::Io(std::io::Error::other(err))),
    }
}
