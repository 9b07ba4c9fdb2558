//! Wall-clock timestamps driven by the runtime's monotonic clock.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

use crate::error::{Result, TurnstileError};

/// Produces UTC timestamps that advance with `tokio::time::Instant`.
///
/// The counter store expires entries on the same monotonic clock, so a
/// record's `expires_at` and its store TTL never drift apart, and pausing
/// the tokio clock in tests freezes both.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    /// Anchor a new clock at the current wall-clock time.
    pub fn new() -> Self {
        Self {
            origin_utc: Utc::now(),
            origin: Instant::now(),
        }
    }

    /// The current time, as the anchor plus monotonic time elapsed since.
    pub fn now(&self) -> Result<DateTime<Utc>> {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| self.origin_utc.checked_add_signed(delta))
            .ok_or_else(|| TurnstileError::Config("clock overflowed the timestamp range".to_string()))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
