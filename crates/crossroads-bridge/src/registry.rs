//! Fan-out to connected WebSocket clients.
//!
//! Each client owns an unbounded outbound channel drained by its writer
//! task. Broadcasting only enqueues, so it never waits on a slow socket;
//! flow control is left to the transport behind the writer.
//!
//! A client is only eligible for broadcasts while [`ConnectionState::Open`].
//! The broadcaster never removes anyone: entries leave the registry when
//! their own connection task observes close or error, or when
//! [`ClientRegistry::clear`] tells every connection to shut down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use axum::extract::ws::Message;
use crossroads_types::ClientId;
use tokio::sync::{Notify, RwLock, mpsc};
use tracing::debug;

/// Readiness of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Registered, handshake not finished yet.
    Connecting = 0,
    /// Receiving broadcasts.
    Open = 1,
    /// Close observed; awaiting removal.
    Closing = 2,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closing,
        }
    }
}

/// A registered client: its readiness and the sending side of its
/// outbound queue.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Message>,
    delivered: AtomicU64,
    shutdown: Notify,
}

impl ClientHandle {
    /// The client's id.
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Current readiness.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Start receiving broadcasts.
    pub fn mark_open(&self) {
        self.state.store(ConnectionState::Open as u8, Ordering::Release);
    }

    /// Stop receiving broadcasts; removal follows.
    pub fn mark_closing(&self) {
        self.state.store(ConnectionState::Closing as u8, Ordering::Release);
    }

    /// Ask the connection to close: queue a close frame for the peer and
    /// wake the task waiting in [`closed`](Self::closed).
    pub fn close(&self) {
        self.mark_closing();
        let _ = self.outbound.send(Message::Close(None));
        self.shutdown.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }

    /// Number of frames enqueued for this client so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Enqueue a frame if the client is open. Returns whether it was queued.
    pub fn send(&self, msg: Message) -> bool {
        if self.state() != ConnectionState::Open {
            return false;
        }
        if self.outbound.send(msg).is_err() {
            return false;
        }
        let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// A set of live WebSocket clients.
#[derive(Debug)]
pub struct ClientRegistry {
    label: &'static str,
    clients: RwLock<HashMap<ClientId, Arc<ClientHandle>>>,
}

impl ClientRegistry {
    /// Create an empty registry. `label` names it in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new client in the [`ConnectionState::Connecting`] state.
    ///
    /// Returns the handle and the receiver the client's writer drains.
    pub async fn register(&self) -> (Arc<ClientHandle>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ClientHandle {
            id: ClientId::new(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound: tx,
            delivered: AtomicU64::new(0),
            shutdown: Notify::new(),
        });
        let mut clients = self.clients.write().await;
        clients.insert(handle.id, Arc::clone(&handle));
        debug!(registry = self.label, client = %handle.id, total = clients.len(), "client registered");
        (handle, rx)
    }

    /// Remove a client. Returns whether it was present.
    pub async fn remove(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(&id).is_some();
        if removed {
            debug!(registry = self.label, client = %id, total = clients.len(), "client removed");
        }
        removed
    }

    /// Enqueue `msg` for every open client except `exclude`.
    ///
    /// Returns the number of clients the frame was queued for.
    pub async fn broadcast(&self, msg: &Message, exclude: Option<ClientId>) -> usize {
        let clients = self.clients.read().await;
        let delivered = clients
            .values()
            .filter(|c| Some(c.id) != exclude)
            .filter(|c| c.send(msg.clone()))
            .count();
        debug!(
            registry = self.label,
            recipients = delivered,
            registered = clients.len(),
            "broadcast frame"
        );
        delivered
    }

    /// Number of registered clients, in any state.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of clients currently in the [`ConnectionState::Open`] state.
    pub async fn open_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.state() == ConnectionState::Open)
            .count()
    }

    /// Whether no client is registered.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Close every client and empty the registry.
    ///
    /// Each connection task is woken, sends a close frame and exits.
    pub async fn clear(&self) {
        let mut clients = self.clients.write().await;
        for client in clients.values() {
            client.close();
        }
        debug!(registry = self.label, closed = clients.len(), "registry cleared");
        clients.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn text(s: &str) -> Message {
        Message::Text(s.into())
    }

    #[tokio::test]
    async fn broadcast_skips_clients_that_are_not_open() {
        let registry = ClientRegistry::new("test");
        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        let (_c, mut rx_c) = registry.register().await;
        a.mark_open();
        b.mark_open();

        let delivered = registry.broadcast(&text("x"), None).await;
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
        // The connecting client stays registered.
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn broadcast_excludes_origin() {
        let registry = ClientRegistry::new("test");
        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        a.mark_open();
        b.mark_open();

        let delivered = registry.broadcast(&text("from a"), Some(a.id())).await;
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), text("from a"));
    }

    #[tokio::test]
    async fn removed_client_stops_receiving() {
        let registry = ClientRegistry::new("test");
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;
        a.mark_open();
        b.mark_open();

        registry.broadcast(&text("1"), None).await;
        assert!(registry.remove(b.id()).await);
        registry.broadcast(&text("2"), None).await;

        assert_eq!(a.delivered(), 2);
        assert_eq!(b.delivered(), 1);
        assert!(!registry.remove(b.id()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn dropped_receiver_is_not_counted() {
        let registry = ClientRegistry::new("test");
        let (a, rx_a) = registry.register().await;
        a.mark_open();
        drop(rx_a);

        assert_eq!(registry.broadcast(&text("x"), None).await, 0);
        assert_eq!(a.delivered(), 0);
    }

    #[tokio::test]
    async fn clear_signals_every_connection() {
        let registry = ClientRegistry::new("test");
        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        a.mark_open();

        registry.clear().await;

        assert!(registry.is_empty().await);
        assert_eq!(a.state(), ConnectionState::Closing);
        assert_eq!(b.state(), ConnectionState::Closing);
        assert_eq!(rx_a.try_recv().unwrap(), Message::Close(None));
        assert_eq!(rx_b.try_recv().unwrap(), Message::Close(None));
        // The wake-up is stored even though nobody was waiting yet.
        tokio::time::timeout(std::time::Duration::from_secs(1), a.closed())
            .await
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), b.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closing_clients_are_skipped_and_clear_empties() {
        let registry = ClientRegistry::new("test");
        let (a, _rx) = registry.register().await;
        a.mark_open();
        a.mark_closing();
        assert_eq!(a.state(), ConnectionState::Closing);
        assert_eq!(registry.broadcast(&text("x"), None).await, 0);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
