//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! wires one presence tracker, one channel hub, and one router over both,
//! shared by every connection. Storage and identity sit behind traits so
//! handlers never name Postgres directly.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::delivery::{MessageRouter, PresenceTracker};
use crate::services::history::MessageStore;
use crate::services::hub::ChannelTransport;
use crate::services::ticket::TicketVerifier;

/// Clone is required by Axum; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub presence: Arc<PresenceTracker>,
    pub hub: Arc<ChannelTransport>,
    pub router: Arc<MessageRouter>,
    pub store: Arc<dyn MessageStore>,
    pub tickets: Arc<dyn TicketVerifier>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, store: Arc<dyn MessageStore>, tickets: Arc<dyn TicketVerifier>) -> Self {
        let presence = Arc::new(PresenceTracker::new(config.presence_channel_capacity));
        let hub = Arc::new(ChannelTransport::new(config.client_send_timeout));
        let router = Arc::new(MessageRouter::new(presence.clone(), hub.clone()));
        Self { config: Arc::new(config), presence, hub, router, store, tickets }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
