use super::types::WindowDecision;
use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-local fixed-window limiter keyed by client address.
///
/// Fixed-window counting is intentional: it accepts window-boundary burst
/// artifacts in exchange for O(1) memory per address and no background
/// sweeping. Counters live in a `DashMap`; mutation happens under the shard
/// lock via the entry API, which is the only synchronization this tier needs.
/// This tier never consults a remote store and therefore never times out.
pub struct WindowLimiter {
    entries: DashMap<IpAddr, WindowCounter>,
    ceiling: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

/// Consumption within one address's current window.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    opened_at: DateTime<Utc>,
}

impl WindowLimiter {
    pub fn new(ceiling: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ceiling,
            window: Duration::seconds(window_secs as i64),
            clock,
        }
    }

    /// Count a request from `addr` and decide whether it may proceed.
    pub fn check(&self, addr: IpAddr) -> WindowDecision {
        let now = self.clock.now();

        let mut entry = self.entries.entry(addr).or_insert_with(|| {
            debug!(%addr, "opening rate window for new address");
            WindowCounter {
                count: 0,
                opened_at: now,
            }
        });

        if now >= entry.opened_at + self.window {
            entry.count = 0;
            entry.opened_at = now;
        }
        entry.count += 1;

        let reset_in = (entry.opened_at + self.window - now).num_seconds().max(1) as u64;

        if entry.count > self.ceiling {
            warn!(%addr, count = entry.count, "address window ceiling exceeded");
            return WindowDecision {
                allowed: false,
                remaining: 0,
                retry_after: reset_in,
            };
        }

        WindowDecision {
            allowed: true,
            remaining: self.ceiling - entry.count,
            retry_after: reset_in,
        }
    }

    /// Number of addresses currently tracked (for monitoring/tests)
    pub fn tracked_addresses(&self) -> usize {
        self.entries.len()
    }
}
