//! Rate limiting logic: rule matching and fixed-window counting.

mod backend;
mod clock;
mod descriptor;
mod limiter;
mod rules;
mod store;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::{DescriptorField, RequestDescriptor};
pub use limiter::FixedWindowLimiter;
pub use rules::{RateLimitRule, RuleSet};
pub use store::{CounterStore, MemoryStore, RedisStore};
pub use window::{CounterKey, TimeInterval};
