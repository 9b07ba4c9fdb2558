//! In-process counter store with per-entry expiration.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::CounterStore;
use crate::error::{Result, TurnstileError};

/// Expiration applied when a caller stores an entry with a zero TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// How often the janitor sweeps expired entries out of the map.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(120 * 60);

struct Entry {
    bytes: Vec<u8>,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

struct StoreInner {
    entries: DashMap<String, Entry>,
    default_ttl: Duration,
}

impl StoreInner {
    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

/// A [`CounterStore`] backed by process memory.
///
/// Expired entries are never returned by [`CounterStore::get`], even before
/// the janitor has physically removed them. Cloning the store yields another
/// handle to the same map.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Create a store using [`DEFAULT_TTL`] for zero-TTL writes.
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Create a store with a custom default expiration.
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                default_ttl,
            }),
        }
    }

    /// The expiration used for writes that pass a zero TTL.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired(Instant::now())
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Spawn a background task that purges expired entries every `interval`.
    ///
    /// The task only holds a weak reference to the map and exits once every
    /// handle to the store has been dropped. Must be called from within a
    /// tokio runtime. A zero `interval` is rejected.
    pub fn spawn_janitor(&self, interval: Duration) -> Result<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "janitor interval must be greater than zero".to_string(),
            ));
        }
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);

        debug!(interval = ?interval, "Starting counter store janitor");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(inner) = weak.upgrade() else {
                    debug!("Counter store dropped, stopping janitor");
                    break;
                };

                let purged = inner.purge_expired(Instant::now());
                debug!(
                    purged = purged,
                    remaining = inner.entries.len(),
                    "Purged expired counter records"
                );
            }
        }))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.inner.entries.len())
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}

impl CounterStore for MemoryStore {
    fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() { self.inner.default_ttl } else { ttl };

        trace!(key = %key, ttl = ?ttl, len = bytes.len(), "Storing entry");

        self.inner.entries.insert(
            key.to_string(),
            Entry {
                bytes,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .inner
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.bytes.clone()))
    }
}
