//! Core fixed-window limiter implementation.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::Admission;
use super::clock::Clock;
use super::counter::CounterRecord;
use crate::error::{Result, TurnstileError};
use crate::store::{CounterStore, MemoryStore};

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 3;
/// Default window duration.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Quota settings for a [`WindowLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum requests admitted per window
    pub max_requests: u64,
    /// Length of a window, starting at the first request after a reset
    pub window_duration: Duration,
}

impl LimiterConfig {
    pub fn new(max_requests: u64, window_duration: Duration) -> Self {
        Self {
            max_requests,
            window_duration,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// Admission control over a per-caller fixed window.
///
/// Each caller gets `max_requests` admissions per window. The window opens on
/// the caller's first request and, once it has elapsed, the next request opens
/// a new one with the count back at 1. Unused quota never carries over.
///
/// The whole read-decide-write sequence runs under a single lock, so
/// concurrent checks can never admit more than `max_requests` per window.
pub struct WindowLimiter<S: CounterStore = MemoryStore> {
    /// Immutable quota settings
    config: LimiterConfig,
    /// `config.window_duration` as a timestamp offset
    window: TimeDelta,
    /// Time source shared with the store's expiry clock
    clock: Clock,
    /// Backing store for counter records
    store: S,
    /// Serializes check-and-update sequences
    lock: Mutex<()>,
}

impl<S: CounterStore> WindowLimiter<S> {
    /// Create a limiter over `store`.
    ///
    /// Fails if the quota is zero or the window cannot be represented.
    pub fn new(config: LimiterConfig, store: S) -> Result<Self> {
        if config.max_requests == 0 {
            return Err(TurnstileError::Config(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if config.window_duration.is_zero() {
            return Err(TurnstileError::Config(
                "window_duration must be greater than zero".to_string(),
            ));
        }
        let window = TimeDelta::from_std(config.window_duration).map_err(|e| {
            TurnstileError::Config(format!("window_duration out of range: {}", e))
        })?;

        Ok(Self {
            config,
            window,
            clock: Clock::new(),
            store,
            lock: Mutex::new(()),
        })
    }

    /// The quota settings this limiter was built with.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether `caller_key` may proceed right now.
    ///
    /// Any store or decoding error aborts the check and is returned as-is;
    /// the limiter never guesses an allow or deny on failure.
    pub fn check_admission(&self, caller_key: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let now = self.clock.now()?;

        let Some(mut record) = self.load(caller_key)? else {
            let record = CounterRecord::new(
                caller_key,
                self.config.window_duration,
                self.window_end(now)?,
            );
            self.save(caller_key, &record)?;

            debug!(
                caller = %caller_key,
                expires_at = %record.expires_at,
                "Opened window for new caller"
            );
            return Ok(true);
        };

        if record.is_active(now) && record.request_count < self.config.max_requests {
            record.increment();
            self.save(caller_key, &record)?;

            trace!(
                caller = %caller_key,
                count = record.request_count,
                limit = self.config.max_requests,
                "Request admitted"
            );
            return Ok(true);
        }

        if !record.is_active(now) {
            let previous = record.request_count;
            record.reset(self.window_end(now)?);
            self.save(caller_key, &record)?;

            debug!(
                caller = %caller_key,
                previous_count = previous,
                expires_at = %record.expires_at,
                "Window elapsed, counter reset"
            );
            return Ok(true);
        }

        debug!(
            caller = %caller_key,
            count = record.request_count,
            limit = self.config.max_requests,
            expires_at = %record.expires_at,
            "Rate limit exceeded"
        );
        Ok(false)
    }

    /// Read the stored record for `caller_key` without changing it.
    pub fn record(&self, caller_key: &str) -> Result<Option<CounterRecord>> {
        let _guard = self.lock.lock();
        self.load(caller_key)
    }

    fn window_end(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_add_signed(self.window).ok_or_else(|| {
            TurnstileError::Config("window end overflows the timestamp range".to_string())
        })
    }

    fn load(&self, caller_key: &str) -> Result<Option<CounterRecord>> {
        match self.store.get(caller_key)? {
            None => Ok(None),
            Some(bytes) => CounterRecord::from_slice(&bytes)
                .map(Some)
                .map_err(TurnstileError::Deserialization),
        }
    }

    fn save(&self, caller_key: &str, record: &CounterRecord) -> Result<()> {
        self.store.set(caller_key, record, self.config.window_duration)
    }
}

impl<S: CounterStore> Admission for WindowLimiter<S> {
    fn check_admission(&self, caller_key: &str) -> Result<bool> {
        WindowLimiter::<S>::check_admission(self, caller_key)
    }
}

impl<S: CounterStore> std::fmt::Debug for WindowLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowLimiter")
            .field("config", &self.config)
            .finish()
    }
}
