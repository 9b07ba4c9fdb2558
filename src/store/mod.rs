//! Key-value storage for per-caller counter records.
//!
//! The limiter only talks to storage through [`CounterStore`], so a
//! different backend (a shared cache, another eviction policy) can be
//! dropped in without touching the admission logic.

mod memory;

pub use memory::{MemoryStore, DEFAULT_PURGE_INTERVAL, DEFAULT_TTL};

use serde::Serialize;
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// A key-value store holding serialized values with per-entry expiration.
pub trait CounterStore: Send + Sync {
    /// Store raw bytes under `key`, expiring `ttl` from now.
    ///
    /// Overwrites any existing entry. A zero `ttl` selects the backend's
    /// default expiration.
    fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Fetch the bytes stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or its entry has expired.
    /// An error means the backend holds something for `key` that cannot be
    /// read back as bytes.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Serialize `value` as JSON and store it under `key`.
    fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + ?Sized,
        Self: Sized,
    {
        let bytes = serde_json::to_vec(value).map_err(TurnstileError::Serialization)?;
        self.put(key, bytes, ttl)
    }
}
