//! Domain types for direct messages, conversations, and delivery status.

use serde::{Deserialize, Serialize};

use crate::ident::{ConversationId, MessageId, Timestamp, UserId};

/// Delivery lifecycle stage of a message.
///
/// Status only ever moves forward: `Sent -> Delivered -> Read`. `Read` is
/// terminal. The variant order matters: `Ord` is derived from it and drives
/// the forward-only transition check.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DeliveryStatus {
    /// Persisted, receiver was not reachable at routing time.
    Sent,
    /// Routed to a live receiver connection.
    Delivered,
    /// Receiver explicitly acknowledged reading the message.
    Read,
}

impl DeliveryStatus {
    /// Returns `true` if moving from `self` to `next` is a strictly forward
    /// transition. Backward or same-state moves are idempotent no-ops for
    /// callers.
    #[must_use]
    pub fn advances_to(self, next: Self) -> bool {
        self < next
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// A fully-populated direct message as it travels over the wire.
///
/// Carries the sender's display name so receiving clients can render the
/// message without a separate profile fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Who sent the message.
    pub sender: UserId,
    /// Sender's display name at send time.
    pub sender_name: String,
    /// Message text.
    pub text: String,
    /// Assigned at creation; monotonically non-decreasing per conversation.
    pub timestamp: Timestamp,
    /// Current delivery lifecycle stage.
    pub status: DeliveryStatus,
}

/// The unique message thread between one unordered pair of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for this conversation.
    pub id: ConversationId,
    /// The two participants, in normalized (sorted) order.
    pub participants: [UserId; 2],
    /// Pointer to the most recent message, if any.
    pub last_message: Option<MessageId>,
    /// Freshness timestamp, bumped on every new message.
    pub updated_at: Timestamp,
}

/// Normalized key for the unordered participant pair of a conversation.
///
/// `new(a, b)` and `new(b, a)` produce the same key, which is what makes
/// find-or-create idempotent for a pair regardless of who messages first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(UserId, UserId);

impl ConversationKey {
    /// Builds the normalized key for a pair of identities.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    /// Returns the participants in normalized order.
    #[must_use]
    pub fn participants(&self) -> [UserId; 2] {
        [self.0.clone(), self.1.clone()]
    }
}
