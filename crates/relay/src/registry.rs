// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: the set of live WebSocket clients and the
//! broadcast fan-out over them.
//!
//! The registry never touches a socket. Each connection is represented by a
//! [`ConnectionHandle`] whose send capability is an unbounded queue drained
//! by the connection's own task, so a broadcast never waits on a slow peer
//! and a peer that vanishes mid-broadcast only shows up as a failed enqueue.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Server-assigned identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An opaque message relayed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    /// The reply sent back to a client that sent this payload.
    pub fn echo(&self) -> Payload {
        match self {
            Self::Text(text) => Self::Text(format!("Echo: {text}")),
            Self::Binary(data) => {
                let mut out = Vec::with_capacity(6 + data.len());
                out.extend_from_slice(b"Echo: ");
                out.extend_from_slice(data);
                Self::Binary(Bytes::from(out))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(data) => f.write_str(&String::from_utf8_lossy(data)),
        }
    }
}

/// Lifecycle of a connection as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done, not yet registered.
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Returned when a payload cannot be queued because the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

impl fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection closed")
    }
}

impl std::error::Error for ConnectionClosed {}

/// Non-owning handle to a connection: enough to queue a payload, ask for a
/// close, and tell whether the connection is still open.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Payload>,
    close: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving end of its outbound queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: ConnectionId::new(), tx, close: CancellationToken::new() }, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        if self.close.is_cancelled() || self.tx.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queue a payload for delivery by the connection task.
    pub fn send(&self, payload: Payload) -> Result<(), ConnectionClosed> {
        if self.close.is_cancelled() {
            return Err(ConnectionClosed);
        }
        self.tx.send(payload).map_err(|_| ConnectionClosed)
    }

    /// Ask the connection task to send a close frame and exit.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }
}

/// The set of registered connections.
///
/// All membership changes go through the inner lock; the size watch is
/// updated while the write lock is held.
pub struct Registry {
    members: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    size_tx: watch::Sender<usize>,
}

impl Registry {
    pub fn new() -> Self {
        let (size_tx, _) = watch::channel(0);
        Self { members: RwLock::new(HashMap::new()), size_tx }
    }

    /// Add a connection. Returns `false` if its id was already registered,
    /// in which case the existing entry is kept.
    pub async fn register(&self, handle: ConnectionHandle) -> bool {
        let mut members = self.members.write().await;
        if members.contains_key(handle.id()) {
            tracing::warn!(conn = %handle.id(), "duplicate registration ignored");
            return false;
        }
        members.insert(handle.id().clone(), handle);
        self.size_tx.send_replace(members.len());
        true
    }

    /// Remove a connection. Unknown ids are a no-op and return `false`.
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let mut members = self.members.write().await;
        let removed = members.remove(id).is_some();
        if removed {
            self.size_tx.send_replace(members.len());
        }
        removed
    }

    /// Queue `payload` for every open connection except `exclude`.
    ///
    /// Membership is snapshotted first so connections closing mid-broadcast
    /// cannot disturb the iteration. Members whose send fails, or that are
    /// no longer open, are unregistered afterwards. Returns the number of
    /// connections the payload was queued for.
    pub async fn broadcast(&self, payload: &Payload, exclude: Option<&ConnectionId>) -> usize {
        let snapshot: Vec<ConnectionHandle> = self.members.read().await.values().cloned().collect();

        let mut delivered = 0;
        let mut stale = Vec::new();
        for handle in &snapshot {
            if exclude == Some(handle.id()) {
                continue;
            }
            if !handle.is_open() {
                stale.push(handle.id().clone());
                continue;
            }
            match handle.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(conn = %handle.id(), err = %e, "broadcast send failed");
                    stale.push(handle.id().clone());
                }
            }
        }

        if !stale.is_empty() {
            let mut members = self.members.write().await;
            for id in &stale {
                members.remove(id);
            }
            self.size_tx.send_replace(members.len());
            tracing::debug!(dropped = stale.len(), "removed stale connections after broadcast");
        }

        delivered
    }

    /// Current number of registered connections.
    pub fn size(&self) -> usize {
        *self.size_tx.borrow()
    }

    pub fn subscribe_size(&self) -> watch::Receiver<usize> {
        self.size_tx.subscribe()
    }

    /// Ask every registered connection to close. Returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let members = self.members.read().await;
        for handle in members.values() {
            handle.close();
        }
        members.len()
    }

    /// Wait until every connection has unregistered, up to `timeout`.
    /// Returns whether the registry drained.
    pub async fn wait_empty(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_size();
        tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await.is_ok_and(|r| r.is_ok())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
