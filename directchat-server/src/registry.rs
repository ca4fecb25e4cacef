//! Connection registry: maps a user identity to its one live connection.
//!
//! Every other component decides reachability through [`ConnectionRegistry::lookup`];
//! nothing else ever touches the underlying map. The registry is process-local
//! and rebuilt empty on restart, so all users appear offline until they
//! reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use directchat_proto::event::{self, ServerEvent};
use directchat_proto::ident::UserId;
use tokio::sync::{RwLock, mpsc};

/// Process-unique identifier for one live socket.
///
/// Lets a disconnect path remove exactly the connection it belongs to: a
/// stale disconnect racing a reconnect compares ids and leaves the newer
/// connection registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocates the next process-unique connection id.
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to one live connection: its id, display name, and the sender half
/// of the channel feeding its WebSocket writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Which socket this handle belongs to.
    pub conn_id: ConnId,
    /// Display name announced for this session.
    pub display_name: String,
    /// Outbound queue; sends are fire-and-forget and never block.
    sender: mpsc::UnboundedSender<Message>,
}

impl ConnectionHandle {
    /// Creates a handle around the sender half of a connection's outbound
    /// channel.
    #[must_use]
    pub fn new(
        conn_id: ConnId,
        display_name: String,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            conn_id,
            display_name,
            sender,
        }
    }

    /// Encodes and enqueues a server event for this connection.
    ///
    /// A closed channel means the connection is going away; the event is
    /// dropped, which is the not-reachable path every caller already
    /// tolerates.
    pub fn emit(&self, event: &ServerEvent) {
        match event::encode_server(event) {
            Ok(bytes) => {
                let _ = self.sender.send(Message::Binary(bytes.into()));
            }
            Err(e) => {
                tracing::error!(conn_id = %self.conn_id, error = %e, "failed to encode server event");
            }
        }
    }

    /// Enqueues a raw WebSocket frame (used for close frames).
    pub fn send_raw(&self, msg: Message) {
        let _ = self.sender.send(msg);
    }
}

/// Maps each user identity to its currently active connection.
///
/// At most one connection per identity; registering again evicts the prior
/// mapping (last-connection-wins). Thread-safe via [`RwLock`]; operations are
/// O(1) lookups with no I/O under the lock.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Associates an identity with a connection, returning the evicted prior
    /// handle if one existed.
    ///
    /// The registry does not close the prior connection; emitting any
    /// disconnect notification for it is the caller's responsibility.
    pub async fn register(&self, user: &UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        conns.insert(user.clone(), handle)
    }

    /// Returns a clone of the handle for the given identity, if reachable.
    pub async fn lookup(&self, user: &UserId) -> Option<ConnectionHandle> {
        let conns = self.connections.read().await;
        conns.get(user).cloned()
    }

    /// Deregisters an identity. Removing an absent identity is a no-op.
    pub async fn remove(&self, user: &UserId) -> Option<ConnectionHandle> {
        let mut conns = self.connections.write().await;
        conns.remove(user)
    }

    /// Deregisters whichever identity owns the given connection, returning it.
    ///
    /// Idempotent: returns `None` when no identity maps to this connection,
    /// including when a reconnect already replaced it with a newer one.
    pub async fn remove_by_conn(&self, conn_id: ConnId) -> Option<UserId> {
        let mut conns = self.connections.write().await;
        let user = conns
            .iter()
            .find(|(_, handle)| handle.conn_id == conn_id)
            .map(|(user, _)| user.clone())?;
        conns.remove(&user);
        Some(user)
    }

    /// Emits an event to every registered connection except the originating
    /// one.
    ///
    /// Global fan-out: recipients need not share a conversation with the
    /// origin. Unbounded sends never suspend, so holding the read lock here
    /// is safe.
    pub async fn broadcast_except(&self, origin: ConnId, event: &ServerEvent) {
        let conns = self.connections.read().await;
        for handle in conns.values() {
            if handle.conn_id != origin {
                handle.emit(event);
            }
        }
    }

    /// Returns the number of currently registered connections.
    pub async fn len(&self) -> usize {
        let conns = self.connections.read().await;
        conns.len()
    }

    /// Returns `true` if no connections are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
