//! Response shaping: quota headers and the 429 payload.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;

use crate::ratelimit::{DenyReason, Quota};

/// Applied limit for the route group.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Requests left in the current window.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Seconds until the current window expires.
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Machine-readable error code carried by every 429 body.
pub const ERROR_CODE: &str = "rate_limit_exceeded";

/// Attach the quota headers to a response.
pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(quota.resets_in.as_secs()));
}

/// Build the 429 response for a denied request.
///
/// Carries the quota headers, a `Retry-After` equal to the limit type's
/// window, and a JSON body that never exposes internal state beyond the
/// human-readable message.
pub fn too_many_requests(quota: &Quota, retry_after_secs: u64, reason: DenyReason) -> Response {
    let message = match reason {
        DenyReason::Blocked => {
            "This client is temporarily blocked after repeated rate limit violations."
        }
        DenyReason::LimitExceeded { just_blocked: true } => {
            "Too many requests. This client has been temporarily blocked after repeated violations."
        }
        DenyReason::LimitExceeded {
            just_blocked: false,
        } => "Too many requests. Please slow down and try again later.",
    };

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": ERROR_CODE,
            "message": message,
        })),
    )
        .into_response();

    let headers = response.headers_mut();
    apply_quota_headers(headers, quota);
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quota() -> Quota {
        Quota {
            limit: 10,
            remaining: 0,
            resets_in: Duration::from_secs(42),
        }
    }

    #[test]
    fn test_quota_headers() {
        let mut headers = HeaderMap::new();
        apply_quota_headers(
            &mut headers,
            &Quota {
                limit: 60,
                remaining: 17,
                resets_in: Duration::from_secs(33),
            },
        );
        assert_eq!(headers[HEADER_LIMIT], "60");
        assert_eq!(headers[HEADER_REMAINING], "17");
        assert_eq!(headers[HEADER_RESET], "33");
    }

    #[test]
    fn test_denied_response_headers() {
        let response = too_many_requests(
            &quota(),
            900,
            DenyReason::LimitExceeded {
                just_blocked: false,
            },
        );
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "900");
        assert_eq!(response.headers()[HEADER_REMAINING], "0");
        assert_eq!(response.headers()[HEADER_LIMIT], "10");
    }

    #[test]
    fn test_block_short_circuit_keeps_quota_headers() {
        let response = too_many_requests(&quota(), 60, DenyReason::Blocked);
        assert!(response.headers().contains_key(HEADER_LIMIT));
        assert!(response.headers().contains_key(HEADER_REMAINING));
        assert!(response.headers().contains_key(HEADER_RESET));
    }
}
