//! Client identity and cache key construction.

use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;

use super::policy::LimitType;

/// Length of the hex-encoded path digest embedded in counter keys.
/// Hashing keeps keys bounded and keeps raw paths out of the key namespace.
const PATH_DIGEST_LEN: usize = 16;

/// The principal a rate limit is tracked against.
///
/// Authenticated requests are tracked by user id so one user cannot evade
/// limits by rotating addresses; everything else is tracked by source IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Authenticated principal with a stable user id
    User(i64),
    /// Unauthenticated client, keyed by source address
    Ip(IpAddr),
    /// Client whose address could not be determined
    Unknown,
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::User(id) => write!(f, "user:{}", id),
            Identifier::Ip(addr) => write!(f, "ip:{}", addr),
            Identifier::Unknown => f.write_str("ip:unknown"),
        }
    }
}

impl Identifier {
    /// Counter key for one `(limit type, identifier, path)` combination.
    pub fn counter_key(&self, limit_type: LimitType, path: &str) -> String {
        format!(
            "rate_limit:{}:{}:{}",
            limit_type,
            self,
            path_digest(path)
        )
    }

    /// Key for the cross-type violation counter of this identifier.
    pub fn violations_key(&self) -> String {
        format!("rate_limit_violations:{}", self)
    }

    /// Key for the block flag of this identifier.
    pub fn blocked_key(&self) -> String {
        format!("rate_limit_blocked:{}", self)
    }
}

/// Stable, truncated hex digest of a request path.
fn path_digest(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(PATH_DIGEST_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_identifier_display() {
        let id = Identifier::User(123);
        assert_eq!(id.to_string(), "user:123");
    }

    #[test]
    fn test_ip_identifier_display() {
        let id = Identifier::Ip("192.168.1.100".parse().unwrap());
        assert_eq!(id.to_string(), "ip:192.168.1.100");
    }

    #[test]
    fn test_counter_key_contains_identifier() {
        let user = Identifier::User(123);
        let key = user.counter_key(LimitType::Write, "/api/projects");
        assert!(key.starts_with("rate_limit:write:user:123:"));

        let ip = Identifier::Ip("192.168.1.100".parse().unwrap());
        let key = ip.counter_key(LimitType::Read, "/api/projects");
        assert!(key.starts_with("rate_limit:read:ip:192.168.1.100:"));
    }

    #[test]
    fn test_distinct_paths_distinct_keys() {
        let id = Identifier::Ip("127.0.0.1".parse().unwrap());
        let a = id.counter_key(LimitType::Default, "/path1");
        let b = id.counter_key(LimitType::Default, "/path2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_distinct_limit_types_distinct_keys() {
        let id = Identifier::Ip("127.0.0.1".parse().unwrap());
        let a = id.counter_key(LimitType::Write, "/api/projects");
        let b = id.counter_key(LimitType::Read, "/api/projects");
        assert_ne!(a, b);
    }

    #[test]
    fn test_path_digest_stable_and_bounded() {
        let a = path_digest("/some/long/path/with/many/segments");
        let b = path_digest("/some/long/path/with/many/segments");
        assert_eq!(a, b);
        assert_eq!(a.len(), PATH_DIGEST_LEN);
    }

    #[test]
    fn test_violation_and_block_keys() {
        let id = Identifier::User(7);
        assert_eq!(id.violations_key(), "rate_limit_violations:user:7");
        assert_eq!(id.blocked_key(), "rate_limit_blocked:user:7");
    }
}
