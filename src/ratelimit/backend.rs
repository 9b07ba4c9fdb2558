//! Admission trait for abstracting the limiting strategy.

use crate::error::Result;

/// Trait for admission-control implementations.
///
/// The HTTP layer depends only on this trait, so the fixed-window limiter
/// can be swapped for another strategy without touching request handling.
pub trait Admission: Send + Sync {
    /// Decide whether `caller_key` may proceed.
    ///
    /// `Ok(false)` means the caller is over its quota. An error means no
    /// decision could be made; callers choose whether to fail open or closed.
    fn check_admission(&self, caller_key: &str) -> Result<bool>;
}
