//! Rate limiting tiers
//!
//! Two of the three admission tiers live here:
//!
//! - **Address window** ([`WindowLimiter`]): process-local fixed-window
//!   counter per client IP. Cheapest gate, applies to every caller.
//! - **Daily quota** ([`DailyQuota`]): per-identity calendar-day counter in a
//!   shared store with atomic increment + expiry, elevated plans only.
//!
//! # Failure policy
//!
//! Each tier carries its own policy instead of a global default: the window
//! limiter is local memory and cannot fail; the daily quota fails open so a
//! counter-store outage never takes down the guarded service.

pub mod daily;
pub mod lua_scripts;
pub mod redis;
pub mod store;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use daily::DailyQuota;
pub use redis::RedisCounterStore;
pub use store::{CounterStore, InMemoryCounterStore};
pub use types::{FailurePolicy, QuotaDecision, WindowDecision};
pub use window::WindowLimiter;
