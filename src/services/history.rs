//! Durable storage for routed messages.
//!
//! DESIGN
//! ======
//! The dispatch layer appends every message as undelivered before routing
//! it, then flags it delivered once a live connection took it. Undelivered
//! rows form the recipient's offline backlog, drained once when they next
//! connect. History reads are
//! pair-wise and paginate backwards with a `before` cursor on `created_at`.
//!
//! The router itself never calls into this module.

use sqlx::PgPool;
use uuid::Uuid;

use crate::delivery::{RoutedMessage, UserId};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub message: RoutedMessage,
    pub delivered: bool,
}

/// Page selector for `history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: i64,
    /// Only messages strictly older than this timestamp (ms).
    pub before: Option<i64>,
}

impl HistoryQuery {
    /// Clamp a client-supplied limit into `1..=max`, defaulting when absent.
    #[must_use]
    pub fn new(limit: Option<i64>, before: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        let max_limit = max_limit.max(1);
        let limit = limit.unwrap_or(default_limit).clamp(1, max_limit);
        Self { limit, before }
    }
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &RoutedMessage, delivered: bool) -> Result<(), StoreError>;

    /// Flag one message as taken by a live connection. Unknown ids are ignored.
    async fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError>;

    /// Messages exchanged between `user` and `peer`, oldest first.
    async fn history(&self, user: UserId, peer: UserId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError>;

    /// Mark the recipient's undelivered messages delivered and return them, oldest first.
    async fn take_undelivered(&self, recipient: UserId) -> Result<Vec<StoredMessage>, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

type MessageRow = (Uuid, Uuid, Uuid, String, i64, bool);

fn from_row((id, sender, recipient, content, created_at, delivered): MessageRow) -> StoredMessage {
    StoredMessage {
        message: RoutedMessage::from_parts(
            id,
            UserId::from_uuid(sender),
            UserId::from_uuid(recipient),
            content,
            created_at,
        ),
        delivered,
    }
}

/// Postgres-backed store over the `chat_messages` table.
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: &RoutedMessage, delivered: bool) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chat_messages (id, sender_id, recipient_id, content, created_at, delivered)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.id())
        .bind(message.sender().as_uuid())
        .bind(message.recipient().as_uuid())
        .bind(message.payload())
        .bind(message.created_at())
        .bind(delivered)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE chat_messages SET delivered = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn history(&self, user: UserId, peer: UserId, query: HistoryQuery) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, sender_id, recipient_id, content, created_at, delivered
             FROM chat_messages
             WHERE ((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1))
               AND ($3::BIGINT IS NULL OR created_at < $3)
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(user.as_uuid())
        .bind(peer.as_uuid())
        .bind(query.before)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        // Newest page was selected; hand it back oldest first.
        Ok(rows.into_iter().rev().map(from_row).collect())
    }

    async fn take_undelivered(&self, recipient: UserId) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "UPDATE chat_messages
             SET delivered = TRUE
             WHERE recipient_id = $1 AND NOT delivered
             RETURNING id, sender_id, recipient_id, content, created_at, delivered",
        )
        .bind(recipient.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<StoredMessage> = rows.into_iter().map(from_row).collect();
        messages.sort_by_key(|m| (m.message.created_at(), m.message.id()));
        Ok(messages)
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
