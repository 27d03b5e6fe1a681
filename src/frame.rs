//! Frame — JSON envelope for every WebSocket message.
//!
//! DESIGN
//! ======
//! - Clients send `request` frames; the server answers with exactly one
//!   `done` or `error` frame whose `parent_id` is the request id.
//! - Server pushes (`chat:message`, `presence:changed`, `session:connected`)
//!   are `request` frames with no parent.
//! - `syscall` is `<prefix>:<op>`; dispatch switches on the prefix and never
//!   looks inside `data` to route.
//! - `data` is a flat string-keyed map of JSON values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::{PresenceEvent, RoutedMessage, now_ms};

pub const FRAME_MESSAGE: &str = "message";
pub const FRAME_CODE: &str = "code";
pub const FRAME_RETRYABLE: &str = "retryable";

pub const SYSCALL_CONNECTED: &str = "session:connected";
pub const SYSCALL_SESSION_ERROR: &str = "session:error";
pub const SYSCALL_CHAT_MESSAGE: &str = "chat:message";
pub const SYSCALL_PRESENCE_CHANGED: &str = "presence:changed";

/// Flat key-value payload.
pub type Data = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch.
    #[serde(default)]
    pub ts: i64,
    /// Authenticated sender. Overwritten by the server on inbound frames.
    #[serde(default)]
    pub from: Option<String>,
    pub syscall: String,
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

/// Grepable error code and retryable flag carried by error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Frame {
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Successful terminal reply carrying `data`.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Error reply from a plain message, with a generic code.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), "E_BAD_REQUEST".into());
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message.into()));
        data.insert(FRAME_RETRYABLE.into(), false.into());
        self.reply(Status::Error, data)
    }

    /// Error reply from a typed error.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        self.reply(Status::Error, error_data(err))
    }

    /// Unsolicited error about the connection itself rather than a request.
    #[must_use]
    pub fn session_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut frame = Self::request(SYSCALL_SESSION_ERROR, error_data(err));
        frame.status = Status::Error;
        frame
    }

    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }

    /// Push frame delivering one chat message to a recipient connection.
    #[must_use]
    pub fn chat_message(message: &RoutedMessage) -> Self {
        Self::request(SYSCALL_CHAT_MESSAGE, message_data(message)).with_from(message.sender().to_string())
    }

    #[must_use]
    pub fn presence_changed(event: &PresenceEvent) -> Self {
        Self::request(SYSCALL_PRESENCE_CHANGED, Data::new())
            .with_data("user_id", event.user_id.to_string())
            .with_data("online", event.online)
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

fn error_data(err: &(impl ErrorCode + ?Sized)) -> Data {
    let mut data = Data::new();
    data.insert(FRAME_CODE.into(), err.error_code().into());
    data.insert(FRAME_MESSAGE.into(), err.to_string().into());
    data.insert(FRAME_RETRYABLE.into(), err.retryable().into());
    data
}

/// Wire shape of one message, shared by live pushes and history replies.
#[must_use]
pub fn message_data(message: &RoutedMessage) -> Data {
    let mut data = Data::new();
    data.insert("id".into(), message.id().to_string().into());
    data.insert("from".into(), message.sender().to_string().into());
    data.insert("to".into(), message.recipient().to_string().into());
    data.insert("content".into(), message.payload().into());
    data.insert("created_at".into(), message.created_at().into());
    data
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Frame {
    /// Everything before the first ':'.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.syscall.split_once(':').map_or(self.syscall.as_str(), |(prefix, _)| prefix)
    }

    /// Everything after the first ':', or empty.
    #[must_use]
    pub fn op(&self) -> &str {
        self.syscall.split_once(':').map_or("", |(_, op)| op)
    }

    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(serde_json::Value::as_i64)
    }

    /// Parse a UUID-shaped string field into any `FromStr` id type.
    #[must_use]
    pub fn data_id<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.data_str(key).and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::UserId;

    #[test]
    fn request_sets_fields() {
        let frame = Frame::request("chat:send", Data::new());
        assert_eq!(frame.syscall, "chat:send");
        assert_eq!(frame.status, Status::Request);
        assert!(frame.parent_id.is_none());
        assert!(frame.ts > 0);
    }

    #[test]
    fn done_with_correlates_to_request() {
        let req = Frame::request("chat:history", Data::new());
        let reply = req.done_with(Data::new());

        assert_eq!(reply.parent_id, Some(req.id));
        assert_eq!(reply.syscall, "chat:history");
        assert_eq!(reply.status, Status::Done);
    }

    #[test]
    fn prefix_and_op() {
        let frame = Frame::request("presence:query", Data::new());
        assert_eq!(frame.prefix(), "presence");
        assert_eq!(frame.op(), "query");

        let frame = Frame::request("bare", Data::new());
        assert_eq!(frame.prefix(), "bare");
        assert_eq!(frame.op(), "");
    }

    #[test]
    fn inbound_json_with_minimal_fields_parses() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"id":"{id}","syscall":"chat:send","status":"request","data":{{"to":"x"}}}}"#);
        let frame: Frame = serde_json::from_str(&raw).expect("parse");

        assert_eq!(frame.id, id);
        assert!(frame.from.is_none());
        assert_eq!(frame.data_str("to"), Some("x"));
    }

    #[test]
    fn error_plain_has_generic_code() {
        let req = Frame::request("chat:send", Data::new());
        let err = req.error("content required");

        assert_eq!(err.status, Status::Error);
        assert_eq!(err.data_str(FRAME_CODE), Some("E_BAD_REQUEST"));
        assert_eq!(err.data_str(FRAME_MESSAGE), Some("content required"));
    }

    #[test]
    fn error_from_typed() {
        #[derive(Debug, thiserror::Error)]
        #[error("store unavailable")]
        struct Down;

        impl ErrorCode for Down {
            fn error_code(&self) -> &'static str {
                "E_DOWN"
            }

            fn retryable(&self) -> bool {
                true
            }
        }

        let req = Frame::request("chat:send", Data::new());
        let err = req.error_from(&Down);

        assert_eq!(err.data_str(FRAME_CODE), Some("E_DOWN"));
        assert_eq!(err.data_str(FRAME_MESSAGE), Some("store unavailable"));
        assert_eq!(err.data.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(true));
    }

    #[test]
    fn session_error_is_unparented_error_push() {
        let conn = crate::delivery::ConnectionId::generate();
        let frame = Frame::session_error(&crate::delivery::SessionError::Closed(conn));

        assert_eq!(frame.syscall, SYSCALL_SESSION_ERROR);
        assert_eq!(frame.status, Status::Error);
        assert!(frame.parent_id.is_none());
        assert_eq!(frame.data_str(FRAME_CODE), Some("E_SESSION_CLOSED"));
        assert_eq!(frame.data.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(false));
    }

    #[test]
    fn chat_message_carries_sender_and_content() {
        let sender = UserId::from_uuid(Uuid::new_v4());
        let recipient = UserId::from_uuid(Uuid::new_v4());
        let msg = RoutedMessage::new(sender, recipient, "hi");

        let frame = Frame::chat_message(&msg);

        assert_eq!(frame.syscall, SYSCALL_CHAT_MESSAGE);
        assert_eq!(frame.from.as_deref(), Some(sender.to_string().as_str()));
        assert_eq!(frame.data_str("content"), Some("hi"));
        assert_eq!(frame.data_id::<UserId>("to"), Some(recipient));
        assert_eq!(frame.data_i64("created_at"), Some(msg.created_at()));
    }

    #[test]
    fn presence_changed_shape() {
        let user = UserId::from_uuid(Uuid::new_v4());
        let frame = Frame::presence_changed(&PresenceEvent { user_id: user, online: false, ts: 1 });

        assert_eq!(frame.syscall, SYSCALL_PRESENCE_CHANGED);
        assert_eq!(frame.data_id::<UserId>("user_id"), Some(user));
        assert_eq!(frame.data.get("online").and_then(serde_json::Value::as_bool), Some(false));
    }
}
