//! Shared counter-store interface for the daily quota tier.

use crate::clock::Clock;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// A key-value store with atomic increment-and-possibly-set-expiry.
///
/// The contract mirrors what the daily quota needs and nothing more: one
/// round trip that increments, sets the expiry only when the increment
/// created the counter, and reports the remaining TTL.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`. The caller whose increment creates the
    /// counter (post-increment count == 1) sets `ttl_secs`. Returns the
    /// post-increment count and the counter's remaining TTL in seconds.
    async fn increment_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<(u64, u64)>;

    /// Connectivity probe for health reporting.
    async fn ping(&self) -> Result<()>;
}

struct CounterEntry {
    count: u64,
    expires_at: DateTime<Utc>,
}

/// Process-local counter store.
///
/// Stands in for the shared store in single-instance deployments and in
/// tests, where the injected clock makes bucket expiry deterministic.
/// Expired entries are replaced lazily on the next increment.
pub struct InMemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<(u64, u64)> {
        let now = self.clock.now();

        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                count: 0,
                expires_at: now + Duration::seconds(ttl_secs as i64),
            });

        if now >= entry.expires_at {
            entry.count = 0;
            entry.expires_at = now + Duration::seconds(ttl_secs as i64);
        }
        entry.count += 1;

        let ttl = (entry.expires_at - now).num_seconds().max(1) as u64;
        Ok((entry.count, ttl))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
