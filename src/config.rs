//! Server configuration parsed from environment variables.
//!
//! Required:
//! - `DATABASE_URL`
//!
//! Optional (defaults in parentheses):
//! - `PORT` (3000), rejected when present but not a port number
//! - `DB_MAX_CONNECTIONS` (5)
//! - `CLIENT_QUEUE_CAPACITY` (256): outbound frames buffered per connection
//! - `CLIENT_SEND_TIMEOUT_MS` (2000): how long a send may wait on a full queue
//! - `PRESENCE_CHANNEL_CAPACITY` (1024)
//! - `MAX_CONTENT_LEN` (4000): characters per chat message
//! - `HISTORY_DEFAULT_LIMIT` (50), `HISTORY_MAX_LIMIT` (200)
//!
//! Malformed optional values fall back to their defaults.

use std::time::Duration;

use crate::delivery::presence::DEFAULT_PRESENCE_CHANNEL_CAPACITY;
use crate::services::history::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_CLIENT_SEND_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_MAX_CONTENT_LEN: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub client_queue_capacity: usize,
    pub client_send_timeout: Duration,
    pub presence_channel_capacity: usize,
    pub max_content_len: usize,
    pub history_default_limit: i64,
    pub history_max_limit: i64,
}

impl AppConfig {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Missing` without `DATABASE_URL` and `Invalid` for a bad `PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading through `lookup`.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let as_usize = |key: &str, default: usize| parse(key).and_then(|v| usize::try_from(v).ok()).unwrap_or(default);

        Ok(Self {
            database_url,
            port,
            db_max_connections: parse("DB_MAX_CONNECTIONS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            client_queue_capacity: as_usize("CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY),
            client_send_timeout: Duration::from_millis(
                parse("CLIENT_SEND_TIMEOUT_MS").unwrap_or(DEFAULT_CLIENT_SEND_TIMEOUT_MS),
            ),
            presence_channel_capacity: as_usize("PRESENCE_CHANNEL_CAPACITY", DEFAULT_PRESENCE_CHANNEL_CAPACITY),
            max_content_len: as_usize("MAX_CONTENT_LEN", DEFAULT_MAX_CONTENT_LEN),
            history_default_limit: parse("HISTORY_DEFAULT_LIMIT")
                .and_then(|v| i64::try_from(v).ok())
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
            history_max_limit: parse("HISTORY_MAX_LIMIT")
                .and_then(|v| i64::try_from(v).ok())
                .unwrap_or(MAX_HISTORY_LIMIT),
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
