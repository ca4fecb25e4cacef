//! Wire events exchanged between chat clients and the server, plus the
//! postcard codec used to frame them on WebSocket binary messages.
//!
//! Inbound sender identity is never trusted from the frame body: after the
//! initial `Announce`, the server attributes every event to the announced
//! identity, so spoofed sender fields cannot occur on the wire at all.

use serde::{Deserialize, Serialize};

use crate::ident::{MessageId, Timestamp, UserId};
use crate::message::{DeliveryStatus, DirectMessage};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Announces the client's identity with a bearer credential.
    ///
    /// Must be the first frame after the WebSocket opens. The server
    /// responds with [`ServerEvent::AnnounceOk`] on success, or closes the
    /// connection if verification fails.
    Announce {
        /// The identity the client claims.
        user_id: UserId,
        /// Opaque bearer credential checked by the authentication layer.
        token: String,
    },

    /// Sends a direct message to another user.
    MessageSend {
        /// Recipient identity.
        receiver: UserId,
        /// Message text; must be non-empty after trimming.
        text: String,
    },

    /// The client started typing to `receiver`.
    TypingStart {
        /// Recipient identity.
        receiver: UserId,
    },

    /// The client stopped typing to `receiver`.
    TypingStop {
        /// Recipient identity.
        receiver: UserId,
    },

    /// The client read the given message.
    MessageReadAck {
        /// The message being acknowledged.
        message_id: MessageId,
    },
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Acknowledges a successful `Announce`.
    AnnounceOk {
        /// The verified identity (echoed back for confirmation).
        user_id: UserId,
    },

    /// Another user's presence changed.
    PresenceChanged {
        /// Whose presence changed.
        user_id: UserId,
        /// `true` when the user came online, `false` when they went offline.
        online: bool,
        /// Set on offline transitions; when the user was last seen.
        last_seen_at: Option<Timestamp>,
    },

    /// A peer started typing to this client.
    TypingStart {
        /// Who is typing.
        sender: UserId,
        /// Typist's display name.
        sender_name: String,
    },

    /// A peer stopped typing to this client.
    TypingStop {
        /// Who stopped typing.
        sender: UserId,
    },

    /// A new message, delivered to the receiver and echoed to the sender.
    MessageNew {
        /// The fully-populated message with its final status.
        message: DirectMessage,
    },

    /// A message's delivery status advanced.
    MessageStatusUpdate {
        /// Which message.
        message_id: MessageId,
        /// The new status.
        status: DeliveryStatus,
    },

    /// An operation initiated by this client failed. Never broadcast.
    MessageError {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a client event into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a client event from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_client(bytes: &[u8]) -> Result<ClientEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a server event into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a server event from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_server(bytes: &[u8]) -> Result<ServerEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
