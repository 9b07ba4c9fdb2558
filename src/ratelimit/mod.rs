//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod limiter;

pub use backend::Admission;
pub use clock::Clock;
pub use counter::CounterRecord;
pub use limiter::{LimiterConfig, WindowLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
