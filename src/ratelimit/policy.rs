//! Rate limit policy tiers and matching.
//!
//! This module defines the limit-type tiers and the table that maps each
//! tier to its `(max_attempts, window)` policy. The table is loaded once at
//! startup; lookups are pure and infallible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Policy applied to any limit type without a configured row.
const DEFAULT_POLICY: Policy = Policy {
    max_attempts: 120,
    window_secs: 60,
};

/// A named tier of rate limiting policy, selected per route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// Authentication endpoints (login, token issuance)
    Auth,
    /// Mutating endpoints
    Write,
    /// Read-only listing endpoints
    Read,
    /// Expensive or sensitive endpoints with a tight budget
    Strict,
    /// Everything else
    Default,
}

impl LimitType {
    /// Parse a limit type name. Unknown names fall back to `Default`
    /// rather than erroring, so a misconfigured route still gets limited.
    pub fn from_name(name: &str) -> Self {
        match name {
            "auth" => LimitType::Auth,
            "write" => LimitType::Write,
            "read" => LimitType::Read,
            "strict" => LimitType::Strict,
            _ => LimitType::Default,
        }
    }

    /// The canonical lowercase name, used in counter keys and logs.
    pub fn name(&self) -> &'static str {
        match self {
            LimitType::Auth => "auth",
            LimitType::Write => "write",
            LimitType::Read => "read",
            LimitType::Strict => "strict",
            LimitType::Default => "default",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rate limit policy: requests allowed per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum requests allowed in the window
    pub max_attempts: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Policy {
    /// The window as a [`Duration`], used as the counter TTL.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Table mapping limit types to policies.
///
/// Every lookup resolves to exactly one policy; limit types without a row
/// resolve to the `default` row.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<LimitType, Policy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            LimitType::Auth,
            Policy {
                max_attempts: 5,
                window_secs: 900,
            },
        );
        policies.insert(
            LimitType::Write,
            Policy {
                max_attempts: 60,
                window_secs: 60,
            },
        );
        policies.insert(
            LimitType::Read,
            Policy {
                max_attempts: 300,
                window_secs: 60,
            },
        );
        policies.insert(
            LimitType::Strict,
            Policy {
                max_attempts: 10,
                window_secs: 60,
            },
        );
        policies.insert(LimitType::Default, DEFAULT_POLICY);
        Self { policies }
    }
}

impl PolicyTable {
    /// Create a table with the built-in tier policies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the built-in policies, replacing any tier that
    /// appears in `overrides`.
    pub fn with_overrides(overrides: &HashMap<LimitType, Policy>) -> Self {
        let mut table = Self::default();
        for (limit_type, policy) in overrides {
            table.policies.insert(*limit_type, *policy);
        }
        table
    }

    /// Look up the policy for a limit type.
    pub fn policy_for(&self, limit_type: LimitType) -> Policy {
        self.policies
            .get(&limit_type)
            .or_else(|| self.policies.get(&LimitType::Default))
            .copied()
            .unwrap_or(DEFAULT_POLICY)
    }
}
