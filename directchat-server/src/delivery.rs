//! Delivery state machine: sent -> delivered -> read.
//!
//! Only two trigger points exist, so the transitions are plain methods
//! rather than a generic transition table. Backward or repeated moves are
//! idempotent no-ops enforced at the storage layer, and acknowledgements
//! for unknown or terminal messages are absorbed with a log line, never an
//! error to the caller.

use std::sync::Arc;

use directchat_proto::event::ServerEvent;
use directchat_proto::ident::{MessageId, UserId};
use directchat_proto::message::{DeliveryStatus, DirectMessage};

use crate::registry::ConnectionRegistry;
use crate::store::{StatusAdvance, Store, StoreError};

/// Advances per-message delivery status and notifies senders of reads.
pub struct DeliveryTracker {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn Store>,
}

impl DeliveryTracker {
    /// Creates a tracker over the shared registry and store.
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Marks a message delivered after it was routed to a reachable
    /// receiver. Returns the updated message when the status advanced, or
    /// `None` on an idempotent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only when the store itself fails; no-op
    /// transitions are not errors.
    pub async fn mark_delivered(
        &self,
        message_id: MessageId,
    ) -> Result<Option<DirectMessage>, StoreError> {
        match self
            .store
            .advance_message_status(message_id, DeliveryStatus::Delivered)
            .await?
        {
            StatusAdvance::Advanced(message) => Ok(Some(message)),
            StatusAdvance::NoOp(current) => {
                tracing::debug!(message_id = %message_id, status = %current, "delivered is a no-op");
                Ok(None)
            }
            StatusAdvance::NotFound => {
                tracing::warn!(message_id = %message_id, "mark_delivered for unknown message");
                Ok(None)
            }
        }
    }

    /// Marks a message read on an explicit acknowledgement from `reader`.
    ///
    /// Absorbed as logged no-ops: unknown message ids, already-read
    /// messages, and acks arriving from the message's own sender (`read`
    /// may only come from the receiver's session). When the status
    /// advances and the original sender is still reachable, a
    /// [`ServerEvent::MessageStatusUpdate`] is emitted to the sender's
    /// connection; an unreachable sender sees the persisted status on its
    /// next history fetch.
    pub async fn mark_read(&self, message_id: MessageId, reader: &UserId) {
        let message = match self.store.find_message(message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!(message_id = %message_id, reader = %reader, "read ack for unknown message, ignoring");
                return;
            }
            Err(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "failed to load message for read ack");
                return;
            }
        };

        if message.sender == *reader {
            tracing::info!(
                message_id = %message_id,
                reader = %reader,
                "read ack from message sender, ignoring"
            );
            return;
        }

        match self
            .store
            .advance_message_status(message_id, DeliveryStatus::Read)
            .await
        {
            Ok(StatusAdvance::Advanced(_)) => {}
            Ok(StatusAdvance::NoOp(current)) => {
                tracing::debug!(message_id = %message_id, status = %current, "read is a no-op");
                return;
            }
            Ok(StatusAdvance::NotFound) => return,
            Err(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "failed to persist read status");
                return;
            }
        }

        // Status is persisted; notify the sender only if still reachable.
        if let Some(sender_conn) = self.registry.lookup(&message.sender).await {
            sender_conn.emit(&ServerEvent::MessageStatusUpdate {
                message_id,
                status: DeliveryStatus::Read,
            });
            tracing::debug!(message_id = %message_id, sender = %message.sender, "read receipt sent");
        } else {
            tracing::debug!(
                message_id = %message_id,
                sender = %message.sender,
                "sender offline, read receipt dropped"
            );
        }
    }
}
