//! Per-caller counter record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state tracked for a single caller within its current window.
///
/// A record only exists once the caller has been admitted at least once, so
/// `request_count` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    /// Opaque caller identifier (IP, user id, API key...)
    pub caller_key: String,
    /// Requests admitted in the current window
    pub request_count: u64,
    /// Window duration the record was created with
    pub window_limit: Duration,
    /// End of the current window
    pub expires_at: DateTime<Utc>,
}

impl CounterRecord {
    /// Start a fresh window for `caller_key` ending at `expires_at`.
    pub fn new(caller_key: &str, window_limit: Duration, expires_at: DateTime<Utc>) -> Self {
        Self {
            caller_key: caller_key.to_string(),
            request_count: 1,
            window_limit,
            expires_at,
        }
    }

    /// Whether the window is still open at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Record one more admitted request in the current window.
    pub fn increment(&mut self) {
        self.request_count += 1;
    }

    /// Start a new window: the count drops back to 1 regardless of any
    /// quota left unused in the previous one.
    pub fn reset(&mut self, expires_at: DateTime<Utc>) {
        self.request_count = 1;
        self.expires_at = expires_at;
    }

    /// Decode a record from the bytes held by a store.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
