//! Configuration management for Gatewatch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{GatewatchError, Result};
use crate::ratelimit::{BlockingPolicy, LimitType, Policy, PolicyTable};

/// Main configuration for the Gatewatch service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewatchConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

impl Default for GatewatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Per-tier policy overrides; tiers not listed keep their built-in
    /// values
    #[serde(default)]
    pub policies: HashMap<LimitType, Policy>,

    /// Violations required before an identifier is blocked
    #[serde(default = "default_block_threshold")]
    pub block_threshold: u64,

    /// Rolling window over which violations accumulate, in seconds
    #[serde(default = "default_violation_window_secs")]
    pub violation_window_secs: u64,

    /// Block duration in seconds
    #[serde(default = "default_block_duration_secs")]
    pub block_duration_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            policies: HashMap::new(),
            block_threshold: default_block_threshold(),
            violation_window_secs: default_violation_window_secs(),
            block_duration_secs: default_block_duration_secs(),
        }
    }
}

fn default_block_threshold() -> u64 {
    10
}

fn default_violation_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_block_duration_secs() -> u64 {
    24 * 60 * 60
}

impl RateLimitingConfig {
    /// Build the policy table, applying any configured overrides.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::with_overrides(&self.policies)
    }

    /// Build the blocking policy.
    pub fn blocking_policy(&self) -> BlockingPolicy {
        BlockingPolicy {
            threshold: self.block_threshold,
            violation_window: Duration::from_secs(self.violation_window_secs),
            block_duration: Duration::from_secs(self.block_duration_secs),
        }
    }
}

impl GatewatchConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| GatewatchError::Config(e.to_string()))
    }
}
