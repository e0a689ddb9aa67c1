//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every ShutdownSignal resolves
//!     → server stops accepting, hub closes its clients
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One shared shutdown flag; triggering it any number of times is safe
//! - Late subscribers still observe a shutdown that already happened
//! - Shutdown has timeout: in-flight requests are aborted after the grace window

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::shutdown_on_signal;
