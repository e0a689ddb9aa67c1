//! Per-connection pumps between a socket and the hub.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};

use crate::websocket::hub::HubHandle;

/// Serve an upgraded socket until either side goes away.
///
/// The reader forwards text and binary frames to the hub; the writer drains
/// the client's queue and pings the peer. When one pump stops the other is
/// cancelled and the client is unregistered exactly once.
pub async fn serve_socket(hub: HubHandle, socket: WebSocket) {
    let (id, queue) = match hub.register().await {
        Ok(registration) => registration,
        Err(err) => {
            tracing::debug!(error = %err, "Rejecting socket");
            return;
        }
    };
    let config = hub.config().clone();
    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_pump(sink, queue, config.ping_period()));
    let mut reader = tokio::spawn(read_pump(stream, hub.clone(), config.pong_wait()));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let _ = hub.unregister(id).await;
    tracing::debug!(client = id, "Socket closed");
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Message>,
    ping_period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    loop {
        tokio::select! {
            message = queue.recv() => match message {
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        return;
                    }
                }
                None => {
                    // Hub closed the queue: eviction or shutdown.
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn read_pump(mut stream: SplitStream<WebSocket>, hub: HubHandle, pong_wait: Duration) {
    loop {
        let frame = match timeout(pong_wait, stream.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                tracing::debug!(error = %err, "Socket read failed");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                tracing::debug!(?pong_wait, "Peer went silent");
                return;
            }
        };
        match frame {
            Message::Text(_) | Message::Binary(_) => {
                if hub.broadcast(frame).await.is_err() {
                    return;
                }
            }
            Message::Close(_) => return,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}
