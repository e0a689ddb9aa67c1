//! Regex HTTP router with middleware chaining, a request context and a
//! WebSocket broadcast hub.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod validation;
pub mod websocket;

pub use config::schema::ServerConfig;
pub use http::{Context, Flow, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::Router;
