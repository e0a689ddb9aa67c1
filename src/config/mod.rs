//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! .env file
//!     → env.rs (KEY=VALUE pairs)
//!     → process environment, or EnvBindings onto a typed value
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    HubConfig, ListenerConfig, LoggingConfig, MetricsConfig, RouterConfig, ServerConfig,
    TimeoutConfig, TlsConfig,
};
