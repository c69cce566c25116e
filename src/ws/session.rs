//! Per-connection chat session
//!
//! A session walks `Connecting -> Open -> Closed`. It is independent of the
//! socket: the WebSocket handler feeds it text frames and the session talks to
//! the registry, which makes the chat behaviour testable with plain channels.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::ChatEvent;
use crate::registry::{ConnectionHandle, ConnectionRegistry, Outbound, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session is not open (state: {0:?})")]
    NotOpen(SessionState),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct Session {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        username: impl Into<String>,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            registry,
            handle: ConnectionHandle::new(username, tx),
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> &str {
        &self.handle.username
    }

    pub fn connection_id(&self) -> &str {
        &self.handle.id
    }

    /// Register under the claimed username. No validation of the name itself.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(SessionError::NotOpen(self.state));
        }

        match self.registry.register(self.handle.clone()).await {
            Ok(_) => {
                self.state = SessionState::Open;
                tracing::info!(
                    username = %self.handle.username,
                    connection_id = %self.handle.id,
                    "Joined chat"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e.into())
            }
        }
    }

    /// Echo `text` back to the author and relay it to everyone else.
    ///
    /// Returns how many other connections received the relay. An error means
    /// this connection's own queue is gone and the session should be closed.
    pub async fn on_text(&self, text: &str) -> Result<usize, SessionError> {
        if self.state != SessionState::Open {
            return Err(SessionError::NotOpen(self.state));
        }

        let username = self.handle.username.as_str();
        self.registry
            .unicast(&ChatEvent::Echo { text }.to_string(), &self.handle)?;

        let recipients = self
            .registry
            .broadcast(
                &ChatEvent::Said { username, text }.to_string(),
                Some(&self.handle.id),
            )
            .await;

        tracing::debug!(username, recipients, "Relayed message");
        Ok(recipients)
    }

    /// Queue a raw frame on this connection
    pub fn send(&self, message: Outbound) -> Result<(), RegistryError> {
        self.handle.send(message)
    }

    /// Leave the chat.
    ///
    /// Returns true if a departure notice went out. A session whose username was
    /// taken over by a newer connection leaves silently. Calling this twice is a
    /// no-op.
    pub async fn close(&mut self) -> bool {
        let was_open = self.state == SessionState::Open;
        self.state = SessionState::Closed;
        if !was_open {
            return false;
        }
        depart(&self.registry, &self.handle).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        // Handler task ended without closing (panic or cancellation)
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let registry = self.registry.clone();
            let handle = self.handle.clone();
            runtime.spawn(async move {
                depart(&registry, &handle).await;
            });
        }
    }
}

async fn depart(registry: &ConnectionRegistry, handle: &ConnectionHandle) -> bool {
    let username = handle.username.as_str();
    let removed = registry.deregister(username, &handle.id).await;

    if handle.is_replaced() || (!removed && registry.contains(username).await) {
        tracing::info!(
            username,
            connection_id = %handle.id,
            "Replaced connection closed"
        );
        return false;
    }

    let recipients = registry
        .broadcast(&ChatEvent::Left { username }.to_string(), None)
        .await;
    tracing::info!(
        username,
        connection_id = %handle.id,
        recipients,
        "Left chat"
    );
    true
}
