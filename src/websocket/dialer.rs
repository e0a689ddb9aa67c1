//! One-shot WebSocket sender.

use futures_util::SinkExt;
use serde::Serialize;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("websocket connection failed: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends JSON payloads to a hub, one connection per message.
#[derive(Debug, Clone)]
pub struct Dialer {
    addr: String,
}

impl Dialer {
    /// `addr` is the full socket URL, e.g. `ws://localhost:8080/ws`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connect, send `data` as one JSON text frame, then close.
    pub async fn send<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), DialError> {
        let payload = serde_json::to_string(data)?;
        let (mut socket, _) = connect_async(self.addr.as_str()).await?;
        socket.send(Message::text(payload)).await?;
        socket.close(None).await?;
        Ok(())
    }
}
