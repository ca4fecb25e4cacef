//! Message router: orchestrates a send from validation to delivery.
//!
//! Persists first, then checks receiver reachability, then emits. The
//! registry lock is never held across store I/O, so one user's storage
//! latency cannot serialize unrelated traffic.

use std::sync::Arc;

use directchat_proto::event::ServerEvent;
use directchat_proto::ident::UserId;

use crate::delivery::DeliveryTracker;
use crate::registry::ConnectionRegistry;
use crate::store::{Store, StoreError};

/// Errors surfaced back to the sending user. Never broadcast.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Message text was empty after trimming whitespace.
    #[error("message text is empty")]
    EmptyMessage,
    /// Message text exceeds the configured maximum length.
    #[error("message too long ({len} bytes, max {max})")]
    TooLong {
        /// Actual length of the trimmed text in bytes.
        len: usize,
        /// Configured maximum in bytes.
        max: usize,
    },
    /// A store operation failed; the send was aborted with no partial state.
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

/// Routes inbound send requests through persistence and delivery.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
    delivery: Arc<DeliveryTracker>,
    max_text_len: usize,
}

impl MessageRouter {
    /// Creates a router over the shared registry, store, and delivery
    /// tracker.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn Store>,
        delivery: Arc<DeliveryTracker>,
        max_text_len: usize,
    ) -> Self {
        Self {
            registry,
            store,
            delivery,
            max_text_len,
        }
    }

    /// Sends a direct message from `sender` to `receiver`.
    ///
    /// Resolves the pair's one conversation, persists the message as
    /// `Sent`, advances it to `Delivered` if the receiver is reachable,
    /// emits to the receiver when reachable, and always echoes the final
    /// message back to the sender's connection.
    ///
    /// # Errors
    ///
    /// [`RouteError::EmptyMessage`] / [`RouteError::TooLong`] on invalid
    /// text, [`RouteError::Store`] when persistence fails. The caller
    /// reports the error to the sender only.
    pub async fn send(
        &self,
        sender: &UserId,
        sender_name: &str,
        receiver: &UserId,
        text: &str,
    ) -> Result<(), RouteError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RouteError::EmptyMessage);
        }
        if text.len() > self.max_text_len {
            return Err(RouteError::TooLong {
                len: text.len(),
                max: self.max_text_len,
            });
        }

        let conversation = self
            .store
            .find_or_create_conversation(sender, receiver)
            .await?;
        let mut message = self
            .store
            .create_message(conversation.id, sender, sender_name, text)
            .await?;

        tracing::debug!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            sender = %sender,
            receiver = %receiver,
            "message persisted"
        );

        // Reachability is checked after persistence; the lookup clones the
        // handle out so no lock is held while emitting.
        if let Some(receiver_conn) = self.registry.lookup(receiver).await {
            if let Some(updated) = self.delivery.mark_delivered(message.id).await? {
                message = updated;
            }
            receiver_conn.emit(&ServerEvent::MessageNew {
                message: message.clone(),
            });
            tracing::debug!(message_id = %message.id, receiver = %receiver, "message delivered live");
        } else {
            tracing::debug!(message_id = %message.id, receiver = %receiver, "receiver offline, left as sent");
        }

        // Echo with the final status so the sender's view is synchronous.
        if let Some(sender_conn) = self.registry.lookup(sender).await {
            sender_conn.emit(&ServerEvent::MessageNew { message });
        }

        Ok(())
    }
}
