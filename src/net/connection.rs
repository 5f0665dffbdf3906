//! Connection registry module
//!
//! Tracks every live client connection and owns the send/close primitives:
//! - Per-connection record with the outbound write queue (single writer per
//!   socket; the queue is drained by one writer task in `handler`)
//! - Thread-safe registry keyed by ephemeral identity
//! - Coordinated shutdown that waits for every receive loop to terminate

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, Result, TavernError};
use crate::net::ident::{self, ClientId};

/// A connected client
pub struct Connection {
    /// Ephemeral identity, reused as the player identity on registration
    pub ident: ClientId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Time of connection establishment
    pub created_at: Instant,
    /// Outbound message queue (drained by the connection's writer task)
    outbound_tx: mpsc::Sender<Message>,
    /// Open flag; cleared on close and on transport failure
    open: AtomicBool,
    /// Signalled when the connection is force-closed
    closed: Notify,
}

impl Connection {
    fn new(ident: ClientId, address: SocketAddr, outbound_tx: mpsc::Sender<Message>) -> Self {
        Self {
            ident,
            address,
            created_at: Instant::now(),
            outbound_tx,
            open: AtomicBool::new(true),
            closed: Notify::new(),
        }
    }

    /// Whether the connection is still open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the connection closed without notifying the receive loop.
    /// Used by the loop itself when the transport ends.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue a text frame for delivery. Fails if the connection is closed.
    pub async fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(TavernError::Network(NetworkError::ConnectionClosed));
        }
        self.outbound_tx
            .send(Message::Text(text))
            .await
            .map_err(|_| TavernError::Network(NetworkError::ConnectionClosed))
    }

    /// Queue a control frame without blocking
    pub fn try_send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(TavernError::Network(NetworkError::ConnectionClosed));
        }
        self.outbound_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TavernError::Network(NetworkError::WriteQueueFull)
            }
            mpsc::error::TrySendError::Closed(_) => {
                TavernError::Network(NetworkError::ConnectionClosed)
            }
        })
    }

    /// Force-close: queue a Close frame, mark closed, and wake the receive loop
    pub fn close(&self) {
        if let Err(e) = self.try_send(Message::Close(None)) {
            trace!(client_id = %self.ident, error = %e, "Close frame not queued");
        }
        self.mark_closed();
        // notify_one stores a permit, so a close that lands before the
        // receive loop starts waiting is still observed
        self.closed.notify_one();
    }

    /// Resolves when the connection is force-closed
    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("ident", &self.ident)
            .field("address", &self.address)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Thread-safe connection registry
pub struct ConnectionRegistry {
    /// Map of identity to connection
    connections: DashMap<ClientId, Arc<Connection>>,
    /// Set once shutdown begins; new registrations are refused
    closing: AtomicBool,
    /// Number of receive loops that have not yet terminated
    active: AtomicUsize,
    /// Signalled whenever `active` drops to zero
    drained: Notify,
}

impl ConnectionRegistry {
    /// Create a new connection registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            closing: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Register a new connection, assigning it a fresh identity
    pub fn register(
        &self,
        address: SocketAddr,
        outbound_tx: mpsc::Sender<Message>,
    ) -> Result<Arc<Connection>> {
        if self.closing.load(Ordering::Acquire) {
            return Err(TavernError::Network(NetworkError::ShuttingDown));
        }

        let ident = ident::generate();
        let connection = Arc::new(Connection::new(ident.clone(), address, outbound_tx));

        self.connections.insert(ident.clone(), connection.clone());
        self.active.fetch_add(1, Ordering::AcqRel);

        info!(client_id = %ident, address = %address, "Connection registered");
        Ok(connection)
    }

    /// Get a connection by identity
    pub fn get(&self, ident: &str) -> Option<Arc<Connection>> {
        self.connections.get(ident).map(|r| r.clone())
    }

    /// Send a text frame to a connection. Fails if the target is unknown or closed.
    pub async fn send(&self, ident: &str, text: String) -> Result<()> {
        let connection = self.get(ident).ok_or_else(|| {
            TavernError::Network(NetworkError::ConnectionNotFound(ident.to_string()))
        })?;
        connection.send(text).await
    }

    /// Force-close a connection by identity
    pub fn close(&self, ident: &str) {
        if let Some(connection) = self.get(ident) {
            connection.close();
        }
    }

    /// Remove a connection after its receive loop has terminated
    pub fn unregister(&self, ident: &str) {
        if let Some((_, connection)) = self.connections.remove(ident) {
            connection.mark_closed();
            debug!(client_id = %ident, "Connection unregistered");
            if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.drained.notify_waiters();
            }
        }
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Whether shutdown has begun
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Stop accepting registrations, force-close every connection, and wait
    /// until all receive loops have terminated. Outstanding handler work is
    /// not drained.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);

        let count = self.connections.len();
        if count > 0 {
            warn!(connections = count, "Force-closing all connections");
        }
        for connection in self.connections.iter() {
            connection.close();
        }

        loop {
            let notified = self.drained.notified();
            if self.active.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }

        info!("Connection registry drained");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
