//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::time::Duration;

use rexroute::config::ServerConfig;
use rexroute::http::HttpServer;
use rexroute::lifecycle::Shutdown;
use rexroute::routing::Router;
use tokio::net::TcpListener;

/// A server running on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Serve `router` until the returned server is dropped.
pub async fn start_server(router: Router) -> TestServer {
    start_server_with(router, Shutdown::new()).await
}

/// Serve `router`, stopping when `shutdown` fires.
pub async fn start_server_with(router: Router, shutdown: Shutdown) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.timeouts.shutdown_grace_secs = 1;
    let server = HttpServer::new(router, config, shutdown.clone());
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    // The listener is already bound; give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(20)).await;
    TestServer { addr, shutdown }
}
