//! Authentication collaborator.
//!
//! Credential storage and verification live outside the messaging core; the
//! server only needs a bearer credential checked against a claimed identity
//! before it will register a connection.

use std::collections::HashMap;

use async_trait::async_trait;
use directchat_proto::ident::UserId;
use tokio::sync::RwLock;

/// Errors produced by credential verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("authentication required")]
    Unauthenticated,
    /// The credential does not match the claimed identity.
    #[error("invalid credential")]
    InvalidCredential,
}

/// Verifies a bearer credential against a claimed identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the verified identity, or an error if the credential is
    /// missing or does not belong to `user_id`.
    async fn verify(&self, user_id: &UserId, token: &str) -> Result<UserId, AuthError>;

    /// Resolves a bare bearer credential to the identity it was issued for.
    async fn resolve(&self, token: &str) -> Result<UserId, AuthError>;
}

/// In-memory token table standing in for the external credential system.
///
/// Tokens are opaque strings issued per identity; verification is an exact
/// match. Lost on restart, like the rest of the process-local state.
#[derive(Default)]
pub struct TokenAuthenticator {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl TokenAuthenticator {
    /// Creates an authenticator with no issued tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a bearer token for an identity and returns it.
    pub async fn issue(&self, user_id: &UserId) -> String {
        let token = format!("tok-{}", uuid::Uuid::now_v7());
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.clone(), user_id.clone());
        token
    }

    /// Registers a pre-chosen token for an identity (used in tests and
    /// seeding).
    pub async fn insert(&self, token: impl Into<String>, user_id: &UserId) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.into(), user_id.clone());
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn verify(&self, user_id: &UserId, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            Some(owner) if owner == user_id => Ok(owner.clone()),
            _ => Err(AuthError::InvalidCredential),
        }
    }

    async fn resolve(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        let tokens = self.tokens.read().await;
        tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}
