//! WebSocket broadcast hub.
//!
//! # Data Flow
//! ```text
//! Upgrade (GET /ws):
//!     HubHandle::upgrade(ctx)
//!     → client.rs: register → spawn reader + writer pumps
//!
//! Inbound frame:
//!     reader pump → HubHandle::broadcast
//!     → hub.rs loop → try_send to every client queue
//!     → writer pumps → sockets
//!
//! Shutdown:
//!     Shutdown::trigger → hub loop drops every client queue → writers send Close
//! ```
//!
//! # Design Decisions
//! - One task owns the client map; every mutation goes through one ordered
//!   command queue, so a register sent before a broadcast is applied first
//! - Client queues are bounded; a full queue evicts the client instead of
//!   blocking the hub
//! - Dropping the hub's sender is the only way a client queue closes

pub mod client;
pub mod dialer;
pub mod hub;

pub use crate::config::HubConfig;
pub use axum::extract::ws::Message;
pub use dialer::{DialError, Dialer};
pub use hub::{ClientId, Hub, HubError, HubHandle};
