use super::store::CounterStore;
use super::types::{FailurePolicy, QuotaDecision};
use crate::clock::{self, Clock};
use crate::metrics;
use std::sync::Arc;
use tracing::warn;

/// Distributed per-identity daily quota.
///
/// Applies to elevated plans only; base plans are already bounded by the
/// address window and the monthly ledger. One bucket exists per
/// (fingerprint, UTC calendar day); the store's atomic increment creates it
/// and self-expires it at the next UTC midnight, so no sweeping is needed.
///
/// Availability beats enforcement here: with `FailurePolicy::Open` (the
/// default) a store fault yields `None`, meaning "allow, no headers", and
/// the fault is logged and counted rather than surfaced to the caller.
pub struct DailyQuota {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    ceiling: u64,
    failure_policy: FailurePolicy,
}

impl DailyQuota {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        prefix: String,
        ceiling: u64,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            prefix,
            ceiling,
            failure_policy,
        }
    }

    /// Count a request against today's bucket for `fingerprint`.
    ///
    /// `None` means the store was unreachable and the open policy applied:
    /// the request proceeds without quota headers.
    pub async fn check(&self, fingerprint: &str) -> Option<QuotaDecision> {
        let now = self.clock.now();
        let key = format!("{}{}:{}", self.prefix, fingerprint, clock::utc_date_key(now));
        let ttl = clock::seconds_until_midnight(now);
        let reset_at = clock::next_utc_midnight(now).timestamp();

        match self.store.increment_with_expiry(&key, ttl).await {
            Ok((count, bucket_ttl)) => {
                if count > self.ceiling {
                    warn!(fingerprint, count, "daily quota ceiling exceeded");
                    metrics::record_tier_denied("daily");
                    Some(QuotaDecision::denied(self.ceiling, reset_at, bucket_ttl))
                } else {
                    Some(QuotaDecision::allowed(count, self.ceiling, reset_at))
                }
            }
            Err(e) => {
                metrics::record_store_failure("daily_quota");
                match self.failure_policy {
                    FailurePolicy::Open => {
                        warn!(error = %e, "daily quota store unreachable, failing open");
                        None
                    }
                    FailurePolicy::Closed => {
                        warn!(error = %e, "daily quota store unreachable, failing closed");
                        Some(QuotaDecision::denied(self.ceiling, reset_at, ttl))
                    }
                }
            }
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}
