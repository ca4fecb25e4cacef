//! WebSocket gateway: shared state, connection lifecycle, and event
//! dispatch.
//!
//! The server accepts WebSocket connections, authenticates an `Announce`
//! frame, registers the user's one connection, and dispatches inbound
//! events to the presence tracker, message router, typing relay, and
//! delivery tracker. On disconnect the user is marked offline.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use directchat_proto::event::{self, ClientEvent, ServerEvent};
use directchat_proto::ident::UserId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::Authenticator;
use crate::delivery::DeliveryTracker;
use crate::http;
use crate::presence::PresenceTracker;
use crate::registry::{ConnId, ConnectionHandle, ConnectionRegistry};
use crate::router::MessageRouter;
use crate::store::Store;
use crate::typing::{TypingRelay, TypingSignal};

/// Default maximum message text length in bytes (4 KB).
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

/// Shared server state wiring the engine components together.
pub struct AppState {
    /// The one source of reachability truth.
    pub registry: Arc<ConnectionRegistry>,
    /// Persistence collaborator.
    pub store: Arc<dyn Store>,
    /// Authentication collaborator.
    pub auth: Arc<dyn Authenticator>,
    /// Online/offline transitions and broadcast.
    pub presence: PresenceTracker,
    /// Message send orchestration.
    pub router: MessageRouter,
    /// Typing signal pass-through.
    pub typing: TypingRelay,
    /// Read acknowledgement handling.
    pub delivery: Arc<DeliveryTracker>,
}

impl AppState {
    /// Wires the engine components over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        auth: Arc<dyn Authenticator>,
        max_text_len: usize,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceTracker::new(Arc::clone(&registry), Arc::clone(&store));
        let delivery = Arc::new(DeliveryTracker::new(
            Arc::clone(&registry),
            Arc::clone(&store),
        ));
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&delivery),
            max_text_len,
        );
        let typing = TypingRelay::new(Arc::clone(&registry));
        Self {
            registry,
            store,
            auth,
            presence,
            router,
            typing,
            delivery,
        }
    }
}

/// Handles an upgraded WebSocket connection for a single user session.
///
/// The connection lifecycle:
/// 1. Wait for an `Announce` frame and verify the credential.
/// 2. Register the connection, mark the user online, send `AnnounceOk`.
/// 3. Enter the event loop, dispatching to the engine components.
/// 4. On disconnect, mark the user offline (unless already evicted by a
///    reconnect).
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some((user, token)) = wait_for_announce(&mut ws_receiver).await else {
        tracing::warn!("connection closed before announce");
        return;
    };

    if let Err(e) = state.auth.verify(&user, &token).await {
        tracing::warn!(user = %user, error = %e, "announce rejected");
        let reject = ServerEvent::MessageError {
            reason: e.to_string(),
        };
        let _ = send_event(&mut ws_sender, &reject).await;
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    // Display name comes from the stored profile; sessions for unknown
    // profiles fall back to the raw identity.
    let display_name = match state.store.find_user(&user).await {
        Ok(Some(profile)) => profile.name,
        Ok(None) => user.as_str().to_string(),
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "profile lookup failed, using identity as name");
            user.as_str().to_string()
        }
    };

    let conn_id = ConnId::next();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(conn_id, display_name.clone(), tx);

    let ack = ServerEvent::AnnounceOk {
        user_id: user.clone(),
    };
    if let Err(e) = send_event(&mut ws_sender, &ack).await {
        tracing::error!(user = %user, error = %e, "failed to send AnnounceOk");
        return;
    }

    state.presence.on_connect(&user, handle).await;

    // Writer task: forward queued events to the WebSocket.
    let writer_user = user.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user = %writer_user, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader task: dispatch inbound events from this user.
    let reader_user = user.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_client_frame(&reader_user, &display_name, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(user = %reader_user, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // A disconnect cancels all future routing to this connection; racing
    // lookups simply observe "absent".
    state.presence.on_disconnect(conn_id).await;
}

/// Waits for the first frame on the WebSocket, expecting an `Announce`.
///
/// Returns the claimed identity and credential, or `None` if the
/// connection closes or a different event arrives first.
async fn wait_for_announce(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<(UserId, String)> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match event::decode_client(&data) {
                Ok(ClientEvent::Announce { user_id, token }) => {
                    if user_id.as_str().is_empty() {
                        tracing::warn!("received Announce with empty user id");
                        return None;
                    }
                    return Some((user_id, token));
                }
                Ok(other) => {
                    tracing::warn!(event = ?other, "expected Announce, got different event");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode announce frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during announce.
            }
        }
    }
    None
}

/// Dispatches one binary frame from an announced user.
///
/// Sender identity comes from the session, never from the frame body, so
/// spoofed sender fields cannot occur.
async fn handle_client_frame(
    user: &UserId,
    display_name: &str,
    data: &[u8],
    state: &Arc<AppState>,
) {
    let event = match event::decode_client(data) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "failed to decode client event");
            return;
        }
    };

    match event {
        ClientEvent::MessageSend { receiver, text } => {
            if let Err(e) = state.router.send(user, display_name, &receiver, &text).await {
                tracing::info!(user = %user, receiver = %receiver, error = %e, "send failed");
                emit_to(state, user, &ServerEvent::MessageError {
                    reason: e.to_string(),
                })
                .await;
            }
        }
        ClientEvent::TypingStart { receiver } => {
            state
                .typing
                .relay(TypingSignal::Start, user, display_name, &receiver)
                .await;
        }
        ClientEvent::TypingStop { receiver } => {
            state
                .typing
                .relay(TypingSignal::Stop, user, display_name, &receiver)
                .await;
        }
        ClientEvent::MessageReadAck { message_id } => {
            state.delivery.mark_read(message_id, user).await;
        }
        ClientEvent::Announce { user_id, .. } => {
            tracing::warn!(
                user = %user,
                announced = %user_id,
                "received duplicate Announce from established session"
            );
        }
    }
}

/// Emits an event to a user's registered connection, if reachable.
async fn emit_to(state: &Arc<AppState>, user: &UserId, event: &ServerEvent) {
    if let Some(handle) = state.registry.lookup(user).await {
        handle.emit(event);
    }
}

/// Encodes and sends a server event directly on a WebSocket sender.
async fn send_event(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), String> {
    let bytes = event::encode_server(event).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the chat server with a pre-configured [`AppState`].
///
/// Returns the bound address and a join handle; binding to port 0 gives an
/// OS-assigned port for tests.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .merge(http::routes())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "chat server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
