//! Hub actor and its handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::config::HubConfig;
use crate::http::{Context, Flow, Handler};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::websocket::client;

/// Identifies one registered client.
pub type ClientId = u64;

const COMMAND_BUFFER: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("websocket hub is stopped")]
    Stopped,
}

type OnMessage = Arc<dyn Fn(&Message) + Send + Sync>;

enum Command {
    Register {
        id: ClientId,
        queue: mpsc::Sender<Message>,
    },
    Unregister(ClientId),
    Broadcast(Message),
    Count(oneshot::Sender<usize>),
}

/// The hub loop. Owns the client map; run it with [`Hub::run`].
pub struct Hub {
    commands: mpsc::Receiver<Command>,
    clients: HashMap<ClientId, mpsc::Sender<Message>>,
    on_message: Option<OnMessage>,
    shutdown: ShutdownSignal,
}

impl Hub {
    /// Create a hub with its own shutdown flag.
    pub fn new(config: HubConfig) -> (Hub, HubHandle) {
        Self::with_shutdown(config, Shutdown::new())
    }

    /// Create a hub that stops when `shutdown` fires.
    pub fn with_shutdown(config: HubConfig, shutdown: Shutdown) -> (Hub, HubHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let hub = Hub {
            commands: rx,
            clients: HashMap::new(),
            on_message: None,
            shutdown: shutdown.subscribe(),
        };
        let handle = HubHandle {
            commands: tx,
            shutdown,
            next_id: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        };
        (hub, handle)
    }

    /// Callback run with every broadcast message after delivery.
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("WebSocket hub started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }

        let closed = self.clients.len();
        self.clients.clear();
        metrics::record_ws_clients(0);
        tracing::info!(closed, "WebSocket hub stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register { id, queue } => {
                self.clients.insert(id, queue);
                tracing::debug!(client = id, clients = self.clients.len(), "Client registered");
            }
            Command::Unregister(id) => {
                if self.clients.remove(&id).is_some() {
                    tracing::debug!(
                        client = id,
                        clients = self.clients.len(),
                        "Client unregistered"
                    );
                }
            }
            Command::Broadcast(message) => {
                self.broadcast(&message);
                if let Some(callback) = &self.on_message {
                    callback(&message);
                }
            }
            Command::Count(reply) => {
                let _ = reply.send(self.clients.len());
                return;
            }
        }
        metrics::record_ws_clients(self.clients.len());
    }

    fn broadcast(&mut self, message: &Message) {
        self.clients
            .retain(|id, queue| match queue.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = *id, "Client queue full, dropping client");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("clients", &self.clients.len())
            .field("on_message", &self.on_message.is_some())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle used by handlers and client pumps to talk to the hub.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Shutdown,
    next_id: Arc<AtomicU64>,
    config: Arc<HubConfig>,
}

impl HubHandle {
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a client with the configured queue capacity.
    pub async fn register(&self) -> Result<(ClientId, mpsc::Receiver<Message>), HubError> {
        self.register_with_capacity(self.config.queue_capacity).await
    }

    pub async fn register_with_capacity(
        &self,
        capacity: usize,
    ) -> Result<(ClientId, mpsc::Receiver<Message>), HubError> {
        if self.shutdown.is_triggered() {
            return Err(HubError::Stopped);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, receiver) = mpsc::channel(capacity.max(1));
        self.send(Command::Register { id, queue }).await?;
        Ok((id, receiver))
    }

    /// Remove a client. Unknown ids are ignored.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubError> {
        self.send(Command::Unregister(id)).await
    }

    /// Deliver `message` to every registered client.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.send(Command::Broadcast(message)).await
    }

    /// Number of registered clients, as seen by the hub loop.
    pub async fn client_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Count(reply)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Stop the hub. Returns `false` if it was already stopping.
    pub fn shutdown(&self) -> bool {
        self.shutdown.trigger()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// A route handler that upgrades the request and serves the socket.
    pub fn handler(&self) -> Handler {
        let hub = self.clone();
        Handler::new(move |ctx: Context| {
            let hub = hub.clone();
            async move { hub.upgrade(ctx).await }
        })
    }

    /// Upgrade the request to a WebSocket served by this hub.
    pub async fn upgrade(&self, ctx: Context) -> Flow {
        let upgrade = match ctx.websocket_upgrade().await {
            Ok(upgrade) => upgrade,
            Err(rejection) => return ctx.abort(rejection.status(), rejection.body_text()),
        };
        let hub = self.clone();
        let response = upgrade
            .max_message_size(self.config.max_message_size)
            .on_failed_upgrade(|err| tracing::warn!(error = %err, "WebSocket upgrade failed"))
            .on_upgrade(move |socket| client::serve_socket(hub, socket));
        ctx.respond(response);
        Flow::Completed
    }

    async fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).await.map_err(|_| HubError::Stopped)
    }
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("config", &self.config)
            .field("stopped", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn text(s: &str) -> Message {
        Message::Text(s.into())
    }

    fn as_text(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let (hub, handle) = Hub::new(HubConfig::default());
        tokio::spawn(hub.run());

        let (_, mut a) = handle.register().await.unwrap();
        let (_, mut b) = handle.register().await.unwrap();
        handle.broadcast(text("hello")).await.unwrap();

        assert_eq!(as_text(a.recv().await.unwrap()), "hello");
        assert_eq!(as_text(b.recv().await.unwrap()), "hello");
        assert_eq!(handle.client_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_slow_client_is_evicted_once() {
        let (hub, handle) = Hub::new(HubConfig::default());
        tokio::spawn(hub.run());

        let (_, mut slow) = handle.register_with_capacity(1).await.unwrap();
        let (_, mut fast) = handle.register_with_capacity(1).await.unwrap();

        handle.broadcast(text("one")).await.unwrap();
        assert_eq!(as_text(fast.recv().await.unwrap()), "one");
        handle.broadcast(text("two")).await.unwrap();
        assert_eq!(as_text(fast.recv().await.unwrap()), "two");

        assert_eq!(handle.client_count().await.unwrap(), 1);
        assert_eq!(as_text(slow.recv().await.unwrap()), "one");
        assert!(slow.recv().await.is_none());

        handle.broadcast(text("three")).await.unwrap();
        assert_eq!(as_text(fast.recv().await.unwrap()), "three");
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let (hub, handle) = Hub::new(HubConfig::default());
        tokio::spawn(hub.run());

        let (id, mut queue) = handle.register().await.unwrap();
        handle.unregister(id).await.unwrap();
        handle.unregister(id).await.unwrap();
        assert!(queue.recv().await.is_none());
        assert_eq!(handle.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_on_message_runs_after_delivery() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let (hub, handle) = Hub::new(HubConfig::default());
        let hub = hub.on_message(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::spawn(hub.run());

        handle.broadcast(text("a")).await.unwrap();
        handle.broadcast(text("b")).await.unwrap();
        handle.client_count().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_harmless() {
        let (hub, handle) = Hub::new(HubConfig::default());
        let task = tokio::spawn(hub.run());
        let (_, mut queue) = handle.register().await.unwrap();

        assert!(handle.shutdown());
        assert!(!handle.shutdown());
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("hub loop exits")
            .unwrap();

        assert!(queue.recv().await.is_none());
        assert_eq!(handle.register().await.unwrap_err(), HubError::Stopped);
        assert_eq!(handle.broadcast(text("late")).await, Err(HubError::Stopped));
        assert_eq!(handle.client_count().await, Err(HubError::Stopped));
    }

    #[tokio::test]
    async fn test_dropping_all_handles_stops_hub() {
        let (hub, handle) = Hub::new(HubConfig::default());
        let task = tokio::spawn(hub.run());
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("hub loop exits")
            .unwrap();
    }
}
