//! Collaborators the delivery core talks to, and the caller-side concerns
//! that sit next to it.
//!
//! ARCHITECTURE
//! ============
//! - `hub`: the WebSocket-backed `Transport`, one bounded queue per connection.
//! - `history`: message persistence, history pages, offline backlog.
//! - `ticket`: one-time WS ticket verification (identity collaborator).
//!
//! Route handlers stay focused on protocol translation; everything that
//! touches storage or connection handles lives here.

pub mod history;
pub mod hub;
pub mod ticket;
