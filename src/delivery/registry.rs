//! Which live connections belong to which user.
//!
//! DESIGN
//! ======
//! Two maps kept in lockstep: `by_user` answers "where is user X reachable",
//! `owners` answers "who owns connection C" so unregister is O(1) without
//! scanning every user. A connection id appears under at most one user; an
//! entry is removed the moment its connection set becomes empty.
//!
//! The registry is plain data with `&mut self` mutators. Serialization of
//! concurrent callers is the presence tracker's job.

use std::collections::{HashMap, HashSet};

use super::{ConnectionId, UserId};

/// Result of a `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// The user had no connections before this call.
    pub came_online: bool,
    /// The connection previously belonged to another user and was moved.
    pub displaced: Option<Unregistered>,
}

/// Result of removing a known connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unregistered {
    pub user_id: UserId,
    /// The user has no connections left.
    pub went_offline: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    owners: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection_id` to `user_id`'s set. Idempotent for a repeated pair.
    pub fn register(&mut self, user_id: UserId, connection_id: ConnectionId) -> Registered {
        let mut displaced = None;
        match self.owners.get(&connection_id) {
            Some(owner) if *owner == user_id => {
                return Registered { came_online: false, displaced: None };
            }
            Some(_) => displaced = self.unregister(connection_id),
            None => {}
        }

        let connections = self.by_user.entry(user_id).or_default();
        let came_online = connections.is_empty();
        connections.insert(connection_id);
        self.owners.insert(connection_id, user_id);

        Registered { came_online, displaced }
    }

    /// Remove `connection_id` from whichever user owns it.
    ///
    /// Returns `None` for an unknown id; duplicate or late disconnects are expected.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Unregistered> {
        let user_id = self.owners.remove(&connection_id)?;

        let went_offline = match self.by_user.get_mut(&user_id) {
            Some(connections) => {
                connections.remove(&connection_id);
                connections.is_empty()
            }
            None => true,
        };
        if went_offline {
            self.by_user.remove(&user_id);
        }

        Some(Unregistered { user_id, went_offline })
    }

    /// Current connections for `user_id`; empty if the user is offline.
    #[must_use]
    pub fn connections_for(&self, user_id: UserId) -> HashSet<ConnectionId> {
        self.by_user.get(&user_id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.by_user.contains_key(&user_id)
    }

    #[cfg(test)]
    #[must_use]
    pub fn owner_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.owners.get(&connection_id).copied()
    }

    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        self.by_user.keys().copied().collect()
    }

    /// Total live connections across all users.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
