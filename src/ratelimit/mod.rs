//! Rate limiting logic and state management.

mod identity;
mod limiter;
mod policy;
mod store;

pub use identity::Identifier;
pub use limiter::{BlockingPolicy, Decision, DenyReason, Quota, RateLimiter};
pub use policy::{LimitType, Policy, PolicyTable};
pub use store::{CounterValue, MemoryStore, RateLimitStore};
