//! HTTP serving surface: middleware wiring and response shaping.

mod middleware;
mod response;

pub use middleware::{
    enforce_rate_limit, resolve_identifier, AuthenticatedUser, RateLimitState,
};
pub use response::{
    apply_quota_headers, too_many_requests, ERROR_CODE, HEADER_LIMIT, HEADER_REMAINING,
    HEADER_RESET,
};
