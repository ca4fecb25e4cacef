//! Read-side HTTP endpoints: user directory, conversation list, and
//! message history.
//!
//! These are the request/response counterparts of the live event protocol;
//! clients use them to catch up after reconnecting. All endpoints require a
//! bearer credential resolved through the authentication collaborator.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use directchat_proto::ident::{ConversationId, UserId};
use directchat_proto::message::{Conversation, DirectMessage};
use serde::Serialize;
use uuid::Uuid;

use crate::socket::AppState;
use crate::store::UserProfile;

/// JSON error body returned by all endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error description.
    pub error: String,
}

type HttpError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, message: impl Into<String>) -> HttpError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Returns the read-side routes, to be merged with the WebSocket route.
pub fn routes() -> axum::Router<Arc<AppState>> {
    axum::Router::new()
        .route("/users", axum::routing::get(list_users))
        .route("/conversations", axum::routing::get(list_conversations))
        .route(
            "/conversations/{id}/messages",
            axum::routing::get(list_messages),
        )
}

/// Resolves the bearer credential in the `Authorization` header.
async fn bearer_user(state: &AppState, headers: &HeaderMap) -> Result<UserId, HttpError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "access token required"))?;

    state
        .auth
        .resolve(token)
        .await
        .map_err(|e| error(StatusCode::UNAUTHORIZED, e.to_string()))
}

/// `GET /users` -- all other users' profiles, online first.
async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>, HttpError> {
    let user = bearer_user(&state, &headers).await?;
    let users = state
        .store
        .list_users_except(&user)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(users))
}

/// `GET /conversations` -- the bearer user's conversations, most recent
/// first.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, HttpError> {
    let user = bearer_user(&state, &headers).await?;
    let conversations = state
        .store
        .list_conversations_for_user(&user)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(conversations))
}

/// `GET /conversations/{id}/messages` -- message history ascending by
/// timestamp.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DirectMessage>>, HttpError> {
    let _user = bearer_user(&state, &headers).await?;
    let messages = state
        .store
        .list_messages(ConversationId::from_uuid(id))
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(messages))
}
