//! Presence tracker: online/offline transitions and global broadcast.
//!
//! Built on the [`ConnectionRegistry`]; every connect/disconnect is
//! persisted through the store and fanned out to all other live
//! connections. Fan-out is global, not conversation-scoped, and reconnects
//! re-broadcast "online" (at-least-once; consumers deduplicate).

use std::sync::Arc;

use directchat_proto::event::ServerEvent;
use directchat_proto::ident::{Timestamp, UserId};

use crate::registry::{ConnId, ConnectionHandle, ConnectionRegistry};
use crate::store::Store;

/// Tracks presence transitions and broadcasts them.
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
}

impl PresenceTracker {
    /// Creates a tracker over the shared registry and store.
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Marks a user online: registers the connection, persists
    /// `is_online = true`, and broadcasts the change to everyone else.
    ///
    /// A reconnect without an intervening disconnect silently replaces the
    /// old connection and still re-broadcasts "online".
    pub async fn on_connect(&self, user: &UserId, handle: ConnectionHandle) {
        let conn_id = handle.conn_id;
        if let Some(evicted) = self.registry.register(user, handle).await {
            tracing::info!(
                user = %user,
                old = %evicted.conn_id,
                new = %conn_id,
                "replaced existing connection (reconnect without disconnect)"
            );
        }

        if let Err(e) = self.store.update_user_presence(user, true, None).await {
            tracing::warn!(user = %user, error = %e, "failed to persist online presence");
        }

        self.registry
            .broadcast_except(
                conn_id,
                &ServerEvent::PresenceChanged {
                    user_id: user.clone(),
                    online: true,
                    last_seen_at: None,
                },
            )
            .await;
        tracing::info!(user = %user, conn_id = %conn_id, "user online");
    }

    /// Marks a user offline if the connection still owns its registry entry.
    ///
    /// A disconnect for a connection that was already evicted by a reconnect
    /// resolves to nothing and is a logged no-op, so the newer session's
    /// presence is untouched.
    pub async fn on_disconnect(&self, conn_id: ConnId) {
        let Some(user) = self.registry.remove_by_conn(conn_id).await else {
            tracing::debug!(conn_id = %conn_id, "disconnect for unregistered connection, ignoring");
            return;
        };

        let last_seen_at = Timestamp::now();
        if let Err(e) = self
            .store
            .update_user_presence(&user, false, Some(last_seen_at))
            .await
        {
            tracing::warn!(user = %user, error = %e, "failed to persist offline presence");
        }

        self.registry
            .broadcast_except(
                conn_id,
                &ServerEvent::PresenceChanged {
                    user_id: user.clone(),
                    online: false,
                    last_seen_at: Some(last_seen_at),
                },
            )
            .await;
        tracing::info!(user = %user, conn_id = %conn_id, "user offline");
    }
}
