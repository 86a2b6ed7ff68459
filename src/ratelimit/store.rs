//! Counter store trait and the in-memory implementation.
//!
//! The limiter core only depends on the atomic-increment-with-TTL contract
//! defined here, so single-instance deployments can use [`MemoryStore`]
//! while multi-instance deployments supply a shared backend (e.g. a
//! Redis-backed store) behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::error::Result;

/// A counter value together with the time left in its window.
#[derive(Debug, Clone, Copy)]
pub struct CounterValue {
    /// Current count within the active window
    pub count: u64,
    /// Time remaining until the entry expires
    pub resets_in: Duration,
}

/// TTL-aware key-value store used for rate limit counters, violation
/// counters, and block flags.
///
/// Entries expire implicitly: an entry past its TTL must be indistinguishable
/// from an absent one, without requiring any background sweep. `increment`
/// must be atomic per key under concurrency — two simultaneous increments of
/// the same key must both be reflected in the final count.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Read the current value for a key, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Atomically increment a counter.
    ///
    /// If the key is absent (or expired) the counter is initialized to 1
    /// with the supplied TTL; otherwise it is incremented and the existing
    /// TTL is preserved, not reset.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterValue>;

    /// Unconditionally set a value with a TTL.
    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<()>;

    /// Explicitly delete a key.
    async fn forget(&self, key: &str) -> Result<()>;

    /// Whether a key is present and unexpired.
    async fn has(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-process store backed by a concurrent hash map.
///
/// Expiry is lazy: expired entries are treated as absent by every operation
/// and removed when next touched. The dashmap entry API provides the per-key
/// atomicity `increment` requires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including not-yet-purged expired
    /// ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries. Primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let snapshot = self.entries.get(key).map(|e| *e);
        match snapshot {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value)),
            Some(_) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<CounterValue> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: now + ttl,
        });

        if entry.is_expired(now) {
            // Fresh window: restart the count and the TTL
            *entry = Entry {
                value: 0,
                expires_at: now + ttl,
            };
        }
        entry.value += 1;

        Ok(CounterValue {
            count: entry.value,
            resets_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
