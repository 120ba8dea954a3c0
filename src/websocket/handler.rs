use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::metrics::{PresenceMetrics, WsMessageMetrics};
use crate::presence::{ConnectionHandle, RegisterOutcome};
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

/// Cookie the social backend stores its session token in
const TOKEN_COOKIE: &str = "jwt";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let identity = match extract_token(&query, &headers) {
        Some(token) => match state.jwt_validator.validate(&token) {
            Ok(claims) => Some(claims.user_id().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "JWT validation failed");
                return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
            }
        },
        None if state.settings.websocket.require_auth => {
            return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
        }
        None => None,
    };

    tracing::debug!(authenticated_user = ?identity, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Extract token from query parameter, Authorization header or session cookie
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, identity),
    fields(authenticated_user = ?identity)
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: Option<String>) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending messages to this connection
    let (tx, mut rx) =
        mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_capacity.max(1));

    let handle = state.registry.connect(tx, identity);
    let connection_id = handle.id;
    PresenceMetrics::record_connection_opened();

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending queued frames to the WebSocket. A close request
    // wins over queued data and also interrupts a write stuck on the peer.
    let close_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                _ = close_handle.close_requested() => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: Utf8Bytes::from_static("server closing connection"),
                        })))
                        .await;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            let frame = match msg {
                OutboundMessage::Ping => Message::Ping(Default::default()),
                data => match data.to_json() {
                    Some(Ok(text)) => Message::Text(text.into()),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Failed to serialize message");
                        continue;
                    }
                    None => continue,
                },
            };

            tokio::select! {
                biased;
                _ = close_handle.close_requested() => break,
                sent = ws_sender.send(frame) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Task for receiving messages from the WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    let user_id = state.registry.unregister(connection_id);

    let duration = connection_start.elapsed().as_secs_f64();
    PresenceMetrics::record_connection_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = ?user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg = match ClientMessage::parse(text.as_str()) {
                Ok(m) => m,
                Err(e) => {
                    WsMessageMetrics::record_invalid();
                    tracing::warn!(connection_id = %handle.id, error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            handle.update_activity();
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; either frame proves the peer is alive
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(state, handle),
    fields(connection_id = %handle.id)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    match msg {
        ClientMessage::RegisterUser { user_id } => {
            WsMessageMetrics::record_register();
            handle_register(user_id, state, handle).await;
        }
        ClientMessage::Ping => {
            WsMessageMetrics::record_ping();
            let _ = handle.send(ServerMessage::pong()).await;
        }
    }
}

/// Handle a `registerUser` message
#[tracing::instrument(
    name = "ws.register",
    skip(state, handle),
    fields(connection_id = %handle.id)
)]
async fn handle_register(user_id: Option<String>, state: &AppState, handle: &Arc<ConnectionHandle>) {
    // Registration without a usable id is ignored
    let Some(user_id) = user_id else {
        tracing::debug!("Registration without user id ignored");
        return;
    };

    if !handle.may_register_as(&user_id) {
        tracing::warn!(
            requested_user = %user_id,
            authenticated_user = ?handle.authenticated_user,
            "Registration for another user rejected"
        );
        let _ = handle
            .send(ServerMessage::error(
                "FORBIDDEN_REGISTRATION",
                "Connection may only register as the authenticated user",
            ))
            .await;
        return;
    }

    if let RegisterOutcome::Registered {
        replaced: Some(previous),
    } = state.registry.register(handle, &user_id)
    {
        tracing::info!(
            user_id = %user_id,
            previous_connection = %previous,
            "Registration replaced an older connection for this user"
        );
    }
}
