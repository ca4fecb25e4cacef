//! Typing signal relay: stateless lookup-and-forward.
//!
//! Nothing is retained or queued; a signal to an unreachable receiver is
//! dropped silently. A missed `stop` (receiver reconnects mid-type) is the
//! consuming UI's problem to time out.

use std::sync::Arc;

use directchat_proto::event::ServerEvent;
use directchat_proto::ident::UserId;

use crate::registry::ConnectionRegistry;

/// Which edge of the typing signal is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// The sender started typing.
    Start,
    /// The sender stopped typing.
    Stop,
}

/// Forwards typing signals to a specific receiver's connection.
pub struct TypingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl TypingRelay {
    /// Creates a relay over the shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forwards a typing signal verbatim if the receiver is reachable.
    pub async fn relay(
        &self,
        signal: TypingSignal,
        sender: &UserId,
        sender_name: &str,
        receiver: &UserId,
    ) {
        let Some(receiver_conn) = self.registry.lookup(receiver).await else {
            tracing::debug!(sender = %sender, receiver = %receiver, "typing signal dropped, receiver offline");
            return;
        };

        let event = match signal {
            TypingSignal::Start => ServerEvent::TypingStart {
                sender: sender.clone(),
                sender_name: sender_name.to_string(),
            },
            TypingSignal::Stop => ServerEvent::TypingStop {
                sender: sender.clone(),
            },
        };
        receiver_conn.emit(&event);
    }
}
