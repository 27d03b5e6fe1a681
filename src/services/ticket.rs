//! WS ticket verification.
//!
//! ARCHITECTURE
//! ============
//! Browsers cannot set headers on a WebSocket upgrade, so the client first
//! obtains a short-lived one-time ticket from the auth service and passes it
//! as `?ticket=`. This module only consumes tickets; issuing them belongs to
//! the auth service. The returned `UserId` is trusted without re-validation.
//!
//! TRADE-OFFS
//! ==========
//! Consumption is destructive (`DELETE ... RETURNING`) to guarantee single
//! use; a dropped upgrade needs a fresh ticket.

use sqlx::{PgPool, Row};

use crate::delivery::UserId;

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait::async_trait]
pub trait TicketVerifier: Send + Sync {
    /// Consume `ticket`, returning its user if it was valid and unexpired.
    async fn verify(&self, ticket: &str) -> Result<Option<UserId>, TicketError>;
}

/// Reject obviously malformed tickets before touching the database.
#[must_use]
pub fn is_well_formed(ticket: &str) -> bool {
    !ticket.is_empty() && ticket.len() <= 128 && ticket.chars().all(|c| c.is_ascii_alphanumeric())
}

pub struct PgTicketVerifier {
    pool: PgPool,
}

impl PgTicketVerifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TicketVerifier for PgTicketVerifier {
    async fn verify(&self, ticket: &str) -> Result<Option<UserId>, TicketError> {
        if !is_well_formed(ticket) {
            return Ok(None);
        }
        let row = sqlx::query("DELETE FROM ws_tickets WHERE ticket = $1 AND expires_at > now() RETURNING user_id")
            .bind(ticket)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| UserId::from_uuid(r.get("user_id"))))
    }
}

#[cfg(test)]
#[path = "ticket_test.rs"]
mod tests;
