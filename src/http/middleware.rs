//! Axum middleware entry point.
//!
//! Each route group is layered with [`enforce_rate_limit`] carrying the
//! limit type for that group; the mapping from endpoints to limit types is
//! the host router's concern, not the limiter's.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::ratelimit::{Decision, Identifier, LimitType, RateLimiter};

use super::response::{apply_quota_headers, too_many_requests};

/// Authenticated principal, inserted into request extensions by the host
/// application's auth layer before this middleware runs.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: i64,
}

/// Middleware state: the shared limiter plus the limit type applied to the
/// route group this instance is layered on.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub limit_type: LimitType,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, limit_type: LimitType) -> Self {
        Self {
            limiter,
            limit_type,
        }
    }
}

/// Evaluate the request against its route group's limit.
///
/// Allowed requests are forwarded and annotated with quota headers; denied
/// requests are answered with 429 directly and never reach the rest of the
/// pipeline.
pub async fn enforce_rate_limit(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let identifier = resolve_identifier(&req);
    let path = req.uri().path().to_string();

    match state.limiter.check(state.limit_type, &identifier, &path).await {
        Decision::Allowed(quota) => {
            let mut response = next.run(req).await;
            apply_quota_headers(response.headers_mut(), &quota);
            response
        }
        Decision::Denied {
            quota,
            retry_after_secs,
            reason,
        } => too_many_requests(&quota, retry_after_secs, reason),
    }
}

/// Derive the rate limit principal for a request.
///
/// Authenticated user id when present, else the client IP taken from
/// `X-Forwarded-For` (first entry), `X-Real-IP`, or the socket address.
pub fn resolve_identifier(req: &Request) -> Identifier {
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        return Identifier::User(user.id);
    }

    let headers = req.headers();
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return Identifier::Ip(ip);
    }
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return Identifier::Ip(ip);
    }
    if let Some(info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Identifier::Ip(info.0.ip());
    }
    Identifier::Unknown
}
