//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum + tower-http layers, connect info)
//!     → Router::serve (route match, middleware chain)
//!     → context.rs (params, store, body binding, response helpers)
//!     → response.rs (buffered sink → HTTP response)
//!     → Send to client
//! ```

pub mod context;
pub mod handler;
pub mod middleware;
pub mod response;
pub mod server;
pub mod static_files;

pub use context::{BodyError, Context, ParamError, RequestSettings};
pub use handler::{Flow, Handler, IntoFlow};
pub use middleware::{compose, from_fn, Middleware, Next};
pub use response::ResponseWriter;
pub use server::{HttpServer, ServerError};
pub use static_files::SpaConfig;
