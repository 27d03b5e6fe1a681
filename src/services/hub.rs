//! Channel hub: the WebSocket transport behind the router.
//!
//! DESIGN
//! ======
//! Each socket loop owns the receiving half of a bounded mpsc queue; the hub
//! owns the only sending half, keyed by `ConnectionId`. `send` converts a
//! routed message into a `chat:message` frame and enqueues it with a
//! deadline. The queue is FIFO, so per-connection ordering is whatever order
//! the router enqueued in.
//!
//! ERROR HANDLING
//! ==============
//! A failed send detaches the connection. Dropping the last sender ends the
//! socket loop's `recv()`, which closes the session. The router unregisters
//! the connection independently; both cleanups are idempotent.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::debug;

use crate::delivery::{ConnectionId, DeliveryError, RoutedMessage, Transport};
use crate::frame::Frame;

pub struct ChannelTransport {
    handles: RwLock<HashMap<ConnectionId, mpsc::Sender<Frame>>>,
    send_timeout: Duration,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(send_timeout: Duration) -> Self {
        Self { handles: RwLock::new(HashMap::new()), send_timeout }
    }

    /// Create the outbound queue for a connection and return its receiver.
    ///
    /// Must happen before the session activates, so that a message routed
    /// right after registration always finds a handle.
    pub fn attach(&self, connection_id: ConnectionId, capacity: usize) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, tx);
        rx
    }

    /// Drop the connection's queue. Returns `false` if it was not attached.
    pub fn detach(&self, connection_id: ConnectionId) -> bool {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection_id)
            .is_some()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_attached(&self, connection_id: ConnectionId) -> bool {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&connection_id)
    }

    fn handle(&self, connection_id: ConnectionId) -> Option<mpsc::Sender<Frame>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, connection_id: ConnectionId, message: &RoutedMessage) -> Result<(), DeliveryError> {
        let Some(tx) = self.handle(connection_id) else {
            return Err(DeliveryError::UnknownConnection(connection_id));
        };

        let result = tx
            .send_timeout(Frame::chat_message(message), self.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::Timeout,
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            });

        if let Err(e) = &result {
            debug!(%connection_id, error = %e, "hub: send failed, detaching");
            self.detach(connection_id);
        }
        result
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
