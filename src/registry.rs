//! Registry of live chat connections
//!
//! Every open WebSocket is represented by a [`ConnectionHandle`]: the sending
//! half of that connection's outbound queue. The per-connection writer task owns
//! the receiving half and the socket sink, so registry operations never block on
//! socket I/O and a single lock can guard both mutation and broadcast iteration.

use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Opaque ID type for a single accepted connection (ULID)
pub type ConnectionId = String;

/// Close code sent to a connection whose username was claimed by a newer one
pub const CLOSE_REPLACED: u16 = 4000;

/// Close code sent to a connection refused because its username is taken
pub const CLOSE_USERNAME_TAKEN: u16 = 4001;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("username already in use: {0}")]
    UsernameTaken(String),

    #[error("connection for {0} is gone")]
    Disconnected(String),
}

/// What a connection's writer task can be asked to put on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Pong(Bytes),
    Close { code: u16, reason: String },
}

/// How to treat a registration whose username is already held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Last writer wins; the previous holder is sent a close frame
    #[default]
    Replace,
    /// Refuse the newcomer while the current holder is still connected
    Reject,
}

impl DuplicatePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Handle to one live connection's outbound queue
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub username: String,
    tx: mpsc::UnboundedSender<Outbound>,
    /// Set once a newer connection has claimed this username
    replaced: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(username: impl Into<String>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            username: username.into(),
            tx,
            replaced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a frame for this connection's writer task
    pub fn send(&self, message: Outbound) -> Result<(), RegistryError> {
        self.tx
            .send(message)
            .map_err(|_| RegistryError::Disconnected(self.username.clone()))
    }

    /// True once the writer task has dropped its end of the queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// True if this connection lost its username to a newer one
    pub fn is_replaced(&self) -> bool {
        self.replaced.load(Ordering::Acquire)
    }
}

/// Username -> live connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    policy: DuplicatePolicy,
}

impl ConnectionRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Store a connection under its username.
    ///
    /// Returns the displaced handle when the username was already held and the
    /// policy is [`DuplicatePolicy::Replace`]; the displaced connection is asked
    /// to close with [`CLOSE_REPLACED`]. Under [`DuplicatePolicy::Reject`] a
    /// collision with a still-connected holder leaves the registry untouched.
    pub async fn register(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Option<ConnectionHandle>, RegistryError> {
        let mut connections = self.connections.write().await;

        if self.policy == DuplicatePolicy::Reject {
            if let Some(existing) = connections.get(&handle.username) {
                if !existing.is_closed() {
                    return Err(RegistryError::UsernameTaken(handle.username));
                }
            }
        }

        let username = handle.username.clone();
        let previous = connections.insert(username.clone(), handle);

        if let Some(ref displaced) = previous {
            displaced.replaced.store(true, Ordering::Release);
            tracing::info!(
                username = %username,
                connection_id = %displaced.id,
                "Username re-claimed, closing previous connection"
            );
            // The old writer may already be gone; nothing left to close then
            let _ = displaced.send(Outbound::Close {
                code: CLOSE_REPLACED,
                reason: "username claimed by a new connection".to_string(),
            });
        }

        Ok(previous)
    }

    /// Remove `username` if it is still held by connection `id`.
    ///
    /// Absent usernames and usernames re-claimed by another connection are left
    /// alone. Returns whether an entry was removed.
    pub async fn deregister(&self, username: &str, id: &str) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(username) {
            Some(handle) if handle.id == id => {
                connections.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Send to exactly one connection
    pub fn unicast(&self, message: &str, handle: &ConnectionHandle) -> Result<(), RegistryError> {
        handle.send(Outbound::Text(message.to_string()))
    }

    /// Send to every registered connection except `exclude`.
    ///
    /// Returns the number of connections that accepted the message. A connection
    /// whose queue is closed is evicted after the pass; it never stops delivery to
    /// the others.
    pub async fn broadcast(&self, message: &str, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let connections = self.connections.read().await;
            for handle in connections.values() {
                if exclude == Some(handle.id.as_str()) {
                    continue;
                }
                match handle.send(Outbound::Text(message.to_string())) {
                    Ok(()) => delivered += 1,
                    Err(_) => dead.push((handle.username.clone(), handle.id.clone())),
                }
            }
        }

        for (username, id) in dead {
            tracing::warn!(
                username = %username,
                connection_id = %id,
                "Dropping connection after failed send"
            );
            self.deregister(&username, &id).await;
        }

        delivered
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.connections.read().await.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Usernames currently online, sorted
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
