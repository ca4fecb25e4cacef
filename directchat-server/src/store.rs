//! Persistence collaborator for users, conversations, and messages.
//!
//! The routing core only ever talks to the narrow [`Store`] trait; durable
//! retention is the backend's concern. [`MemoryStore`] is the in-process
//! implementation used by the server binary and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use directchat_proto::ident::{ConversationId, MessageId, Timestamp, UserId};
use directchat_proto::message::{Conversation, ConversationKey, DeliveryStatus, DirectMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    /// The backend failed to complete the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A stored user profile with presence fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable account identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Whether the user currently has a live connection.
    pub is_online: bool,
    /// When the user was last seen going offline.
    pub last_seen_at: Timestamp,
}

/// Outcome of a forward-only status advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusAdvance {
    /// The status moved forward; the updated message is returned.
    Advanced(DirectMessage),
    /// The message already was at or past the requested status.
    NoOp(DeliveryStatus),
    /// No message with that id exists.
    NotFound,
}

/// Narrow persistence contract the routing core needs.
///
/// Implementations must make `find_or_create_conversation` atomic for an
/// unordered pair and `advance_message_status` forward-only, so racing
/// callers cannot create duplicate conversations or move a status backward.
#[async_trait]
pub trait Store: Send + Sync {
    /// Looks up a user profile by identity.
    async fn find_user(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Persists a presence transition for a user.
    ///
    /// `last_seen_at` is recorded on offline transitions. Unknown users get
    /// a minimal profile so presence is observable without prior seeding.
    async fn update_user_presence(
        &self,
        user: &UserId,
        online: bool,
        last_seen_at: Option<Timestamp>,
    ) -> Result<(), StoreError>;

    /// Returns the one conversation for the unordered pair, creating it on
    /// first contact. Exactly one conversation ever exists per pair.
    async fn find_or_create_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Conversation, StoreError>;

    /// Persists a new message with status [`DeliveryStatus::Sent`] and bumps
    /// the conversation's last-message pointer and freshness timestamp in
    /// the same write.
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender: &UserId,
        sender_name: &str,
        text: &str,
    ) -> Result<DirectMessage, StoreError>;

    /// Looks up a single message by id.
    async fn find_message(&self, message_id: MessageId)
    -> Result<Option<DirectMessage>, StoreError>;

    /// Advances a message's status, refusing backward or same-state moves.
    async fn advance_message_status(
        &self,
        message_id: MessageId,
        status: DeliveryStatus,
    ) -> Result<StatusAdvance, StoreError>;

    /// Returns a conversation's messages ordered by timestamp ascending.
    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<DirectMessage>, StoreError>;

    /// Returns the conversations a user participates in, most recent first.
    async fn list_conversations_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Returns all other users' profiles, online first then by name.
    async fn list_users_except(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    users: HashMap<UserId, UserProfile>,
    conversations: HashMap<ConversationId, Conversation>,
    by_pair: HashMap<ConversationKey, ConversationId>,
    messages: HashMap<MessageId, DirectMessage>,
    by_conversation: HashMap<ConversationId, Vec<MessageId>>,
}

/// In-memory [`Store`] implementation.
///
/// All mutation happens under one write lock, which gives every multi-step
/// write (find-or-create, message + conversation bump) all-or-nothing
/// visibility.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user profile. Used for seeding accounts that
    /// the excluded registration layer would normally create.
    pub async fn upsert_user(&self, profile: UserProfile) {
        let mut inner = self.inner.write().await;
        inner.users.insert(profile.id.clone(), profile);
    }
}

fn minimal_profile(user: &UserId) -> UserProfile {
    UserProfile {
        id: user.clone(),
        name: user.as_str().to_string(),
        email: String::new(),
        is_online: false,
        last_seen_at: Timestamp::from_millis(0),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, user: &UserId) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user).cloned())
    }

    async fn update_user_presence(
        &self,
        user: &UserId,
        online: bool,
        last_seen_at: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .users
            .entry(user.clone())
            .or_insert_with(|| minimal_profile(user));
        profile.is_online = online;
        if let Some(ts) = last_seen_at {
            profile.last_seen_at = ts;
        }
        Ok(())
    }

    async fn find_or_create_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Conversation, StoreError> {
        let key = ConversationKey::new(a.clone(), b.clone());
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.by_pair.get(&key)
            && let Some(conversation) = inner.conversations.get(id)
        {
            return Ok(conversation.clone());
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            participants: key.participants(),
            last_message: None,
            updated_at: Timestamp::now(),
        };
        inner.by_pair.insert(key, conversation.id);
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn create_message(
        &self,
        conversation_id: ConversationId,
        sender: &UserId,
        sender_name: &str,
        text: &str,
    ) -> Result<DirectMessage, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = inner.conversations.get_mut(&conversation_id) else {
            return Err(StoreError::ConversationNotFound(conversation_id));
        };

        // Clamp to the conversation's previous freshness timestamp so
        // per-conversation message timestamps never decrease.
        let timestamp = Timestamp::now().max(conversation.updated_at);
        let message = DirectMessage {
            id: MessageId::new(),
            conversation_id,
            sender: sender.clone(),
            sender_name: sender_name.to_string(),
            text: text.to_string(),
            timestamp,
            status: DeliveryStatus::Sent,
        };

        conversation.last_message = Some(message.id);
        conversation.updated_at = timestamp;
        inner
            .by_conversation
            .entry(conversation_id)
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<DirectMessage>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&message_id).cloned())
    }

    async fn advance_message_status(
        &self,
        message_id: MessageId,
        status: DeliveryStatus,
    ) -> Result<StatusAdvance, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(message) = inner.messages.get_mut(&message_id) else {
            return Ok(StatusAdvance::NotFound);
        };
        if !message.status.advances_to(status) {
            return Ok(StatusAdvance::NoOp(message.status));
        }
        message.status = status;
        Ok(StatusAdvance::Advanced(message.clone()))
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<DirectMessage> = inner
            .by_conversation
            .get(&conversation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn list_conversations_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.participants.contains(user))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn list_users_except(&self, user: &UserId) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserProfile> = inner
            .users
            .values()
            .filter(|p| &p.id != user)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.is_online.cmp(&a.is_online).then(a.name.cmp(&b.name)));
        Ok(users)
    }
}
