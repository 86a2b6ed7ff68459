//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::error::GatewatchError;

use super::identity::Identifier;
use super::policy::{LimitType, Policy, PolicyTable};
use super::store::RateLimitStore;

/// Escalation policy for repeat offenders.
///
/// Violations are counted per identifier across every limit type and path;
/// once the threshold is reached the identifier is blocked outright for the
/// block duration, regardless of its per-window counters.
#[derive(Debug, Clone, Copy)]
pub struct BlockingPolicy {
    /// Violations required to trigger a block
    pub threshold: u64,
    /// Rolling window over which violations accumulate
    pub violation_window: Duration,
    /// How long a triggered block lasts
    pub block_duration: Duration,
}

impl Default for BlockingPolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            violation_window: Duration::from_secs(24 * 60 * 60),
            block_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Quota snapshot for one request, surfaced through response headers.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    /// The applied limit (`X-RateLimit-Limit`)
    pub limit: u32,
    /// Requests left in the window, floored at 0 (`X-RateLimit-Remaining`)
    pub remaining: u32,
    /// Time until the window expires (`X-RateLimit-Reset`)
    pub resets_in: Duration,
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The per-window quota is exhausted. `just_blocked` is set when this
    /// denial tripped the block threshold.
    LimitExceeded { just_blocked: bool },
    /// The identifier carries an active block flag.
    Blocked,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    /// Forward the request, attaching the quota headers
    Allowed(Quota),
    /// Reject with 429 without invoking the rest of the pipeline
    Denied {
        quota: Quota,
        /// `Retry-After` value: the limit type's window in seconds
        retry_after_secs: u64,
        reason: DenyReason,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

/// The core rate limiter.
///
/// Stateless apart from the injected store; safe to share across tasks
/// behind an `Arc`.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: PolicyTable,
    blocking: BlockingPolicy,
}

impl RateLimiter {
    /// Create a limiter with the built-in policy table and default
    /// blocking policy.
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_policies(store, PolicyTable::new(), BlockingPolicy::default())
    }

    /// Create a limiter with explicit policies.
    pub fn with_policies(
        store: Arc<dyn RateLimitStore>,
        policies: PolicyTable,
        blocking: BlockingPolicy,
    ) -> Self {
        Self {
            store,
            policies,
            blocking,
        }
    }

    /// The underlying counter store.
    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Evaluate one request against the limit type's policy.
    ///
    /// The block check runs first and unconditionally: a blocked identifier
    /// is denied before any counter is touched, so clearing a transient
    /// counter never lets a blocked client through.
    pub async fn check(
        &self,
        limit_type: LimitType,
        identifier: &Identifier,
        path: &str,
    ) -> Decision {
        let policy = self.policies.policy_for(limit_type);

        match self.store.has(&identifier.blocked_key()).await {
            Ok(true) => {
                debug!(
                    identifier = %identifier,
                    limit_type = %limit_type,
                    "Denying request from blocked client"
                );
                return Decision::Denied {
                    quota: Quota {
                        limit: policy.max_attempts,
                        remaining: 0,
                        resets_in: policy.window(),
                    },
                    retry_after_secs: policy.window_secs,
                    reason: DenyReason::Blocked,
                };
            }
            Ok(false) => {}
            Err(e) => return self.fail_open(&e, policy),
        }

        let counter_key = identifier.counter_key(limit_type, path);
        trace!(key = %counter_key, "Checking rate limit");

        let counter = match self.store.increment(&counter_key, policy.window()).await {
            Ok(counter) => counter,
            Err(e) => return self.fail_open(&e, policy),
        };

        if counter.count <= u64::from(policy.max_attempts) {
            return Decision::Allowed(Quota {
                limit: policy.max_attempts,
                remaining: policy.max_attempts.saturating_sub(counter.count as u32),
                resets_in: counter.resets_in,
            });
        }

        warn!(
            identifier = %identifier,
            limit_type = %limit_type,
            path = path,
            count = counter.count,
            "Rate limit exceeded"
        );

        let just_blocked = self.record_violation(identifier).await;

        Decision::Denied {
            quota: Quota {
                limit: policy.max_attempts,
                remaining: 0,
                resets_in: counter.resets_in,
            },
            retry_after_secs: policy.window_secs,
            reason: DenyReason::LimitExceeded { just_blocked },
        }
    }

    /// Record one violation for the identifier and escalate to a block once
    /// the threshold is reached. Returns whether a block was triggered by
    /// this violation.
    async fn record_violation(&self, identifier: &Identifier) -> bool {
        let violations = match self
            .store
            .increment(&identifier.violations_key(), self.blocking.violation_window)
            .await
        {
            Ok(counter) => counter.count,
            Err(e) => {
                error!(
                    identifier = %identifier,
                    error = %e,
                    "Failed to record rate limit violation"
                );
                return false;
            }
        };

        if violations < self.blocking.threshold {
            return false;
        }

        match self
            .store
            .put(&identifier.blocked_key(), 1, self.blocking.block_duration)
            .await
        {
            Ok(()) => {
                warn!(
                    identifier = %identifier,
                    violations = violations,
                    "Blocked client after repeated rate limit violations"
                );
                true
            }
            Err(e) => {
                error!(
                    identifier = %identifier,
                    error = %e,
                    "Failed to record block flag"
                );
                false
            }
        }
    }

    /// Store fault policy: log and allow with an untouched quota. A degraded
    /// limiter must not deny service on behalf of a healthy API.
    fn fail_open(&self, error: &GatewatchError, policy: Policy) -> Decision {
        error!(error = %error, "Rate limit store unavailable, allowing request");
        Decision::Allowed(Quota {
            limit: policy.max_attempts,
            remaining: policy.max_attempts,
            resets_in: policy.window(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::policy::Policy;
    use crate::ratelimit::store::{CounterValue, MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;

    fn ip(addr: &str) -> Identifier {
        Identifier::Ip(addr.parse::<IpAddr>().unwrap())
    }

    fn limiter_with(
        store: Arc<MemoryStore>,
        overrides: &[(LimitType, u32, u64)],
        blocking: BlockingPolicy,
    ) -> RateLimiter {
        let overrides: HashMap<LimitType, Policy> = overrides
            .iter()
            .map(|&(lt, max_attempts, window_secs)| {
                (
                    lt,
                    Policy {
                        max_attempts,
                        window_secs,
                    },
                )
            })
            .collect();
        RateLimiter::with_policies(store, PolicyTable::with_overrides(&overrides), blocking)
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let client = ip("127.0.0.1");

        for n in 1..=10u32 {
            let decision = limiter.check(LimitType::Strict, &client, "/api/export").await;
            match decision {
                Decision::Allowed(quota) => {
                    assert_eq!(quota.limit, 10);
                    assert_eq!(quota.remaining, 10 - n);
                }
                _ => panic!("request {} should be allowed", n),
            }
        }

        match limiter.check(LimitType::Strict, &client, "/api/export").await {
            Decision::Denied {
                quota,
                retry_after_secs,
                reason,
            } => {
                assert_eq!(quota.remaining, 0);
                assert_eq!(retry_after_secs, 60);
                assert_eq!(
                    reason,
                    DenyReason::LimitExceeded {
                        just_blocked: false
                    }
                );
            }
            _ => panic!("11th request should be denied"),
        }
    }

    #[tokio::test]
    async fn test_auth_denial_carries_window_retry_after() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let client = ip("10.0.0.1");

        for _ in 0..5 {
            assert!(limiter
                .check(LimitType::Auth, &client, "/auth/login")
                .await
                .is_allowed());
        }

        match limiter.check(LimitType::Auth, &client, "/auth/login").await {
            Decision::Denied {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 900),
            _ => panic!("6th auth request should be denied"),
        }
    }

    #[tokio::test]
    async fn test_paths_have_independent_counters() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter_with(
            store,
            &[(LimitType::Write, 2, 60)],
            BlockingPolicy::default(),
        );
        let client = ip("127.0.0.1");

        limiter.check(LimitType::Write, &client, "/path1").await;
        limiter.check(LimitType::Write, &client, "/path1").await;
        assert!(!limiter
            .check(LimitType::Write, &client, "/path1")
            .await
            .is_allowed());

        assert!(limiter
            .check(LimitType::Write, &client, "/path2")
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_limit_types_have_independent_counters() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter_with(
            store,
            &[(LimitType::Write, 1, 60), (LimitType::Read, 5, 60)],
            BlockingPolicy::default(),
        );
        let client = ip("127.0.0.1");

        limiter.check(LimitType::Write, &client, "/api/projects").await;
        assert!(!limiter
            .check(LimitType::Write, &client, "/api/projects")
            .await
            .is_allowed());

        // Same identifier and path, different tier: still under limit
        assert!(limiter
            .check(LimitType::Read, &client, "/api/projects")
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_violations_aggregate_across_limit_types() {
        let store = Arc::new(MemoryStore::new());
        let blocking = BlockingPolicy {
            threshold: 4,
            ..BlockingPolicy::default()
        };
        let limiter = limiter_with(
            store,
            &[(LimitType::Auth, 1, 900), (LimitType::Write, 1, 60)],
            blocking,
        );
        let client = ip("203.0.113.9");

        // Two violations on auth, two on write
        for _ in 0..3 {
            limiter.check(LimitType::Auth, &client, "/auth/login").await;
        }
        for _ in 0..3 {
            limiter.check(LimitType::Write, &client, "/api/projects").await;
        }

        // Fourth violation tripped the block; a read request is now denied
        // even though its own counter is empty
        match limiter.check(LimitType::Read, &client, "/api/projects").await {
            Decision::Denied { reason, .. } => assert_eq!(reason, DenyReason::Blocked),
            _ => panic!("blocked client should be denied on every tier"),
        }
    }

    #[tokio::test]
    async fn test_block_survives_counter_reset() {
        let store = Arc::new(MemoryStore::new());
        let blocking = BlockingPolicy {
            threshold: 3,
            ..BlockingPolicy::default()
        };
        let limiter = limiter_with(store.clone(), &[(LimitType::Strict, 1, 60)], blocking);
        let client = ip("127.0.0.1");

        limiter.check(LimitType::Strict, &client, "/api/export").await;
        let mut saw_block = false;
        for _ in 0..3 {
            if let Decision::Denied {
                reason: DenyReason::LimitExceeded { just_blocked },
                ..
            } = limiter.check(LimitType::Strict, &client, "/api/export").await
            {
                saw_block |= just_blocked;
            }
        }
        assert!(saw_block, "third violation should trigger the block");

        // Clearing the per-window counter must not unblock the client
        store
            .forget(&client.counter_key(LimitType::Strict, "/api/export"))
            .await
            .unwrap();

        match limiter.check(LimitType::Strict, &client, "/api/export").await {
            Decision::Denied { reason, quota, .. } => {
                assert_eq!(reason, DenyReason::Blocked);
                assert_eq!(quota.remaining, 0);
            }
            _ => panic!("blocked client slipped through after counter reset"),
        }
    }

    #[tokio::test]
    async fn test_remaining_never_exceeds_limit() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let client = ip("127.0.0.1");

        for _ in 0..15 {
            match limiter.check(LimitType::Strict, &client, "/api/export").await {
                Decision::Allowed(quota) | Decision::Denied { quota, .. } => {
                    assert!(quota.remaining <= quota.limit);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_checks_allow_exactly_limit() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(limiter_with(
            store,
            &[(LimitType::Default, 10, 60)],
            BlockingPolicy::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .check(LimitType::Default, &ip("127.0.0.1"), "/api/projects")
                    .await
                    .is_allowed()
            }));
        }

        let results = futures::future::join_all(handles).await;
        let allowed = results
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(allowed, 10);
    }

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn get(&self, _key: &str) -> crate::error::Result<Option<u64>> {
            Err(GatewatchError::Store("backend down".into()))
        }
        async fn increment(
            &self,
            _key: &str,
            _ttl: Duration,
        ) -> crate::error::Result<CounterValue> {
            Err(GatewatchError::Store("backend down".into()))
        }
        async fn put(&self, _key: &str, _value: u64, _ttl: Duration) -> crate::error::Result<()> {
            Err(GatewatchError::Store("backend down".into()))
        }
        async fn forget(&self, _key: &str) -> crate::error::Result<()> {
            Err(GatewatchError::Store("backend down".into()))
        }
        async fn has(&self, _key: &str) -> crate::error::Result<bool> {
            Err(GatewatchError::Store("backend down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));
        let decision = limiter
            .check(LimitType::Strict, &ip("127.0.0.1"), "/api/export")
            .await;
        assert!(decision.is_allowed());
    }
}
