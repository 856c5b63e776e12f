// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection acceptor.
//!
//! Each accepted client gets one task that owns the socket and moves
//! through `Connecting → Open → Closed`. The task multiplexes three sources:
//! its close token (shutdown), its outbound queue (broadcasts, echoes, the
//! welcome frame) and inbound frames from the client.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::EchoPolicy;
use crate::error::RelayError;
use crate::registry::{ConnectionHandle, ConnectionState, Payload};
use crate::state::{iso_timestamp, RelayState};

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { message: String, timestamp: String },
}

impl ServerMessage {
    pub fn welcome(message: &str) -> Self {
        Self::Welcome { message: message.to_owned(), timestamp: iso_timestamp() }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Accept a WebSocket upgrade on any path that no other route claims.
/// Requests that are not upgrades get a 404.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(_) => return RelayError::NotFound.into_response(),
    };
    if state.shutdown.is_cancelled() {
        return RelayError::ShuttingDown.into_response();
    }

    let path = uri.path().to_owned();
    ws.on_upgrade(move |socket| handle_connection(state, socket, path)).into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<RelayState>, socket: WebSocket, path: String) {
    let (handle, mut outbound) = ConnectionHandle::new();
    let id = handle.id().clone();
    let mut phase = ConnectionState::Connecting;
    tracing::debug!(conn = %id, path = %path, state = %phase, "upgrade complete");

    // Queued before registration so it precedes any broadcast.
    if state.config.welcome {
        match serde_json::to_string(&ServerMessage::welcome(&state.config.welcome_message)) {
            Ok(json) => {
                let _ = handle.send(Payload::Text(json));
            }
            Err(e) => tracing::warn!(conn = %id, err = %e, "failed to encode welcome"),
        }
    }

    state.registry.register(handle.clone()).await;
    phase = ConnectionState::Open;
    tracing::info!(
        conn = %id,
        path = %path,
        state = %phase,
        clients = state.registry.size(),
        "client connected"
    );

    // Registered after shutdown already swept the registry.
    if state.shutdown.is_cancelled() {
        handle.close();
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    let reason = loop {
        tokio::select! {
            biased;

            _ = handle.closed() => {
                let frame = CloseFrame { code: close_code::AWAY, reason: "server shutting down".into() };
                if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
                    tracing::debug!(conn = %id, err = %e, "close frame not delivered");
                }
                break "closed by server";
            }

            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    break "outbound queue closed";
                };
                if let Err(e) = ws_tx.send(into_message(payload)).await {
                    tracing::warn!(conn = %id, err = %e, "send to client failed");
                    break "send error";
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_client_payload(&state, &handle, Payload::Text(text.as_str().to_owned())).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        on_client_payload(&state, &handle, Payload::Binary(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break "client closed",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(conn = %id, err = %e, "websocket transport error");
                        break "transport error";
                    }
                }
            }
        }
    };

    handle.close();
    state.registry.unregister(&id).await;
    phase = ConnectionState::Closed;
    tracing::info!(
        conn = %id,
        reason,
        state = %phase,
        remaining = state.registry.size(),
        "client disconnected"
    );
}

/// Apply the configured echo policy to a payload received from `sender`.
async fn on_client_payload(state: &RelayState, sender: &ConnectionHandle, payload: Payload) {
    tracing::info!(conn = %sender.id(), bytes = payload.len(), payload = %payload, "message from client");

    match state.config.echo_policy {
        EchoPolicy::Log => {}
        EchoPolicy::Echo => {
            let _ = sender.send(payload.echo());
        }
        EchoPolicy::EchoBroadcast => {
            let _ = sender.send(payload.echo());
            let fanned = state.registry.broadcast(&payload, Some(sender.id())).await;
            tracing::debug!(conn = %sender.id(), fanned, "relayed client message");
        }
    }
}

fn into_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(data) => Message::Binary(data),
    }
}
