//! Real-time delivery core: presence tracking and message routing.
//!
//! ARCHITECTURE
//! ============
//! Leaves first:
//! - `registry`: `UserId -> {ConnectionId}` map with a reverse index.
//! - `presence`: the registry behind one lock, plus presence-changed events.
//! - `router`: fan-out of a `RoutedMessage` to every live connection of the
//!   recipient, or `Undeliverable` when there are none.
//! - `session`: `Connecting -> Active -> Closed` lifecycle of one physical
//!   connection, driving registry mutations.
//!
//! The core never opens sockets and never persists. Physical connections are
//! owned by a [`Transport`] implementation that only hands opaque
//! `ConnectionId`s in; persistence is the caller's job when routing reports
//! `Undeliverable`.

pub mod presence;
pub mod registry;
pub mod router;
pub mod session;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use presence::{PresenceEvent, PresenceTracker};
pub use router::{DeliveryOutcome, MessageRouter, RouteOutcome};
pub use session::{CloseReason, DeliverySession, SessionError, SessionState};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable per-account identifier, supplied by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of one live transport connection. Generated per session, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl UserId {
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl ConnectionId {
    /// Allocate a fresh connection id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

// =============================================================================
// ROUTED MESSAGE
// =============================================================================

/// One chat message on its way from sender to recipient.
///
/// Fields are private: a message is immutable once constructed and is only
/// ever shared by reference while it fans out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedMessage {
    id: Uuid,
    sender: UserId,
    recipient: UserId,
    payload: String,
    created_at: i64,
}

impl RoutedMessage {
    /// Build a new message stamped with a fresh id and the current time.
    pub fn new(sender: UserId, recipient: UserId, payload: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), sender, recipient, payload: payload.into(), created_at: now_ms() }
    }

    /// Rebuild a message read back from storage.
    #[must_use]
    pub fn from_parts(id: Uuid, sender: UserId, recipient: UserId, payload: String, created_at: i64) -> Self {
        Self { id, sender, recipient, payload, created_at }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn sender(&self) -> UserId {
        self.sender
    }

    #[must_use]
    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

// =============================================================================
// TRANSPORT SEAM
// =============================================================================

/// Why a single connection could not take a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("no transport handle for connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection closed")]
    Closed,
    #[error("connection send timed out")]
    Timeout,
}

impl crate::frame::ErrorCode for DeliveryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "E_UNKNOWN_CONNECTION",
            Self::Closed => "E_CONNECTION_CLOSED",
            Self::Timeout => "E_SEND_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// The transport collaborator's send primitive.
///
/// Implementations own the physical connections. Timeouts, if any, belong
/// here rather than in the router.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, connection_id: ConnectionId, message: &RoutedMessage) -> Result<(), DeliveryError>;
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
