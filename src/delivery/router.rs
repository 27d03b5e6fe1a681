//! Fan-out of one message to every live connection of its recipient.
//!
//! DESIGN
//! ======
//! `route` snapshots the recipient's connections, then attempts one send per
//! connection concurrently. Attempts are independent: a failure on one tab
//! neither blocks nor rolls back delivery to the others. Each failed
//! connection is unregistered on the spot, so stale entries heal without a
//! heartbeat sweep.
//!
//! An empty snapshot yields `Undeliverable` without touching the transport.
//! Persisting the message is then up to the caller.
//!
//! ORDERING
//! ========
//! `route` returns only after every send has completed. A producer that
//! awaits each call before the next therefore lands its messages on every
//! target connection in call order, given a FIFO transport.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use super::presence::PresenceTracker;
use super::{ConnectionId, DeliveryError, RoutedMessage, Transport};

/// What happened on one target connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered(ConnectionId),
    Failed(ConnectionId, DeliveryError),
}

impl DeliveryOutcome {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::Delivered(id) | Self::Failed(id, _) => *id,
        }
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The recipient had no live connection. Nothing was sent.
    Undeliverable,
    /// One outcome per connection that was live when routing started.
    Attempted(Vec<DeliveryOutcome>),
}

impl RouteOutcome {
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        match self {
            Self::Undeliverable => 0,
            Self::Attempted(outcomes) => outcomes.iter().filter(|o| o.is_delivered()).count(),
        }
    }

    /// Per-connection errors, in snapshot order.
    #[must_use]
    pub fn failures(&self) -> Vec<&DeliveryError> {
        match self {
            Self::Undeliverable => Vec::new(),
            Self::Attempted(outcomes) => outcomes
                .iter()
                .filter_map(|o| match o {
                    DeliveryOutcome::Failed(_, reason) => Some(reason),
                    DeliveryOutcome::Delivered(_) => None,
                })
                .collect(),
        }
    }

    /// True when no connection took the message, including the all-failed case.
    #[must_use]
    pub fn reached_nobody(&self) -> bool {
        self.delivered_count() == 0
    }
}

pub struct MessageRouter {
    presence: Arc<PresenceTracker>,
    transport: Arc<dyn Transport>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(presence: Arc<PresenceTracker>, transport: Arc<dyn Transport>) -> Self {
        Self { presence, transport }
    }

    pub async fn route(&self, message: RoutedMessage) -> RouteOutcome {
        let targets = self.presence.connections_for(message.recipient());
        if targets.is_empty() {
            debug!(id = %message.id(), recipient = %message.recipient(), "route: recipient offline");
            return RouteOutcome::Undeliverable;
        }

        let message = &message;
        let attempts = targets.into_iter().map(move |connection_id| async move {
            match self.transport.send(connection_id, message).await {
                Ok(()) => DeliveryOutcome::Delivered(connection_id),
                Err(reason) => DeliveryOutcome::Failed(connection_id, reason),
            }
        });
        let outcomes = join_all(attempts).await;

        for outcome in &outcomes {
            if let DeliveryOutcome::Failed(connection_id, reason) = outcome {
                warn!(%connection_id, error = %reason, id = %message.id(), "route: delivery failed, unregistering");
                self.presence.on_disconnect(*connection_id);
            }
        }

        debug!(
            id = %message.id(),
            recipient = %message.recipient(),
            attempted = outcomes.len(),
            delivered = outcomes.iter().filter(|o| o.is_delivered()).count(),
            "route: fan-out complete"
        );
        RouteOutcome::Attempted(outcomes)
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
