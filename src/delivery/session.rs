//! Lifecycle of one physical connection.
//!
//! LIFECYCLE
//! =========
//! `Connecting -> Active -> Closed`, with `Closed` terminal.
//! - `new` allocates a fresh `ConnectionId`; nothing is registered yet.
//! - `activate` runs once the transport handshake completes and registers
//!   the connection with the presence tracker.
//! - `close` unregisters an active session. Closing twice is a no-op.
//! - Dropping a session that was never closed closes it, so an early return
//!   in the socket loop cannot leak a registry entry.
//!
//! A closed session never comes back; a reconnect is a new session.

use std::sync::Arc;

use tracing::info;

use super::presence::PresenceTracker;
use super::{ConnectionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the socket ended cleanly.
    ClientClosed,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// The outbound queue was dropped by the transport, e.g. after a failed send.
    QueueClosed,
    /// The session went out of scope without an explicit close.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} is already active")]
    AlreadyActive(ConnectionId),
    #[error("session {0} is closed")]
    Closed(ConnectionId),
}

impl crate::frame::ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyActive(_) => "E_SESSION_ACTIVE",
            Self::Closed(_) => "E_SESSION_CLOSED",
        }
    }
}

pub struct DeliverySession {
    connection_id: ConnectionId,
    user_id: UserId,
    state: SessionState,
    presence: Arc<PresenceTracker>,
}

impl DeliverySession {
    #[must_use]
    pub fn new(user_id: UserId, presence: Arc<PresenceTracker>) -> Self {
        Self { connection_id: ConnectionId::generate(), user_id, state: SessionState::Connecting, presence }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register with the presence tracker. Valid only from `Connecting`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyActive` or `Closed` when called from any other state.
    pub fn activate(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connecting => {
                self.presence.on_connect(self.user_id, self.connection_id);
                self.state = SessionState::Active;
                info!(connection_id = %self.connection_id, user_id = %self.user_id, "session: active");
                Ok(())
            }
            SessionState::Active => Err(SessionError::AlreadyActive(self.connection_id)),
            SessionState::Closed => Err(SessionError::Closed(self.connection_id)),
        }
    }

    pub fn close(&mut self, reason: CloseReason) {
        match self.state {
            SessionState::Closed => return,
            SessionState::Active => {
                self.presence.on_disconnect(self.connection_id);
            }
            SessionState::Connecting => {}
        }
        self.state = SessionState::Closed;
        info!(connection_id = %self.connection_id, user_id = %self.user_id, ?reason, "session: closed");
    }
}

impl Drop for DeliverySession {
    fn drop(&mut self) {
        self.close(CloseReason::Dropped);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
