//! Online/offline policy over the connection registry.
//!
//! DESIGN
//! ======
//! One `std::sync::Mutex` guards the whole registry. Every operation is a
//! handful of hash-map touches with no I/O and never holds the lock across
//! an await point. Connect and disconnect for the same user are therefore
//! strictly serialized.
//!
//! Presence-changed events go out on a `tokio::sync::broadcast` channel.
//! Sending never blocks; with no subscribers the event is dropped, and a
//! subscriber that falls behind skips events. Events are sent while the lock
//! is held so that one user's transitions are seen in the order they happened.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use super::registry::{ConnectionRegistry, Unregistered};
use super::{ConnectionId, UserId, now_ms};

pub const DEFAULT_PRESENCE_CHANNEL_CAPACITY: usize = 1024;

/// A user crossed the offline/online boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub online: bool,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

pub struct PresenceTracker {
    registry: Mutex<ConnectionRegistry>,
    events: broadcast::Sender<PresenceEvent>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self { registry: Mutex::new(ConnectionRegistry::new()), events }
    }

    /// True iff the user has at least one live connection.
    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.registry().is_online(user_id)
    }

    /// Snapshot of the user's live connections.
    #[must_use]
    pub fn connections_for(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.registry().connections_for(user_id).into_iter().collect()
    }

    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        self.registry().online_users()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry().connection_count()
    }

    pub fn on_connect(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut registry = self.registry();
        let registered = registry.register(user_id, connection_id);

        if let Some(displaced) = registered.displaced {
            self.notify_offline(displaced);
        }
        if registered.came_online {
            debug!(%user_id, %connection_id, "presence: online");
            self.emit(user_id, true);
        }
    }

    /// Returns `false` when the connection was not registered.
    pub fn on_disconnect(&self, connection_id: ConnectionId) -> bool {
        let mut registry = self.registry();
        let Some(removed) = registry.unregister(connection_id) else {
            return false;
        };
        self.notify_offline(removed);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    fn notify_offline(&self, removed: Unregistered) {
        if removed.went_offline {
            debug!(user_id = %removed.user_id, "presence: offline");
            self.emit(removed.user_id, false);
        }
    }

    fn emit(&self, user_id: UserId, online: bool) {
        // Err only means nobody is subscribed right now.
        let _ = self.events.send(PresenceEvent { user_id, online, ts: now_ms() });
    }

    fn registry(&self) -> MutexGuard<'_, ConnectionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
