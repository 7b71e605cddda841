//! Monthly entitlement ledger.
//!
//! Tracks lifetime and current-month usage against the plan-derived ceiling,
//! embedded in the identity's durable record. Month rollover is detected
//! lazily on access: when the stored (year, month) differs from the current
//! one, the month counter is zeroed before anything else happens, so an
//! identity that slept through a boundary reports its full allowance on
//! first touch.
//!
//! The pipeline uses this tier twice: as a hard pre-gate before the handler
//! and as best-effort post-hoc accounting after it.

use crate::auth::store::{IdentityStore, UsageCounters};
use crate::auth::PlanTier;
use crate::clock::{self, Clock};
use crate::error::Result;
use chrono::{DateTime, Datelike, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// An identity's standing against its monthly allowance.
#[derive(Debug, Clone, Copy)]
pub struct MonthlyStanding {
    pub ceiling: u64,
    pub used_this_month: u64,
    pub remaining: u64,
    pub lifetime: u64,
    /// First instant of the next month (when the allowance refills)
    pub resets_at: DateTime<Utc>,
}

/// Monthly usage ledger over the durable identity store.
pub struct MonthlyLedger {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl MonthlyLedger {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current standing after applying any pending month rollover.
    pub async fn remaining(&self, id: Uuid, plan: PlanTier) -> Result<MonthlyStanding> {
        let now = self.clock.now();
        let usage = self
            .store
            .update_usage(id, now.year(), now.month(), false)
            .await?;
        Ok(self.standing(plan, usage, now))
    }

    /// Count one served request against the ledger.
    pub async fn record_usage(&self, id: Uuid, plan: PlanTier) -> Result<MonthlyStanding> {
        let now = self.clock.now();
        let usage = self
            .store
            .update_usage(id, now.year(), now.month(), true)
            .await?;
        Ok(self.standing(plan, usage, now))
    }

    fn standing(&self, plan: PlanTier, usage: UsageCounters, now: DateTime<Utc>) -> MonthlyStanding {
        let ceiling = plan.monthly_ceiling();
        MonthlyStanding {
            ceiling,
            used_this_month: usage.month,
            remaining: ceiling.saturating_sub(usage.month),
            lifetime: usage.lifetime,
            resets_at: clock::next_month_start(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys;
    use crate::auth::store::{IdentityRecord, InMemoryIdentityStore};
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    async fn ledger_with_identity(
        usage: UsageCounters,
        plan: PlanTier,
        now: DateTime<Utc>,
    ) -> (MonthlyLedger, Uuid, Arc<ManualClock>) {
        let store = Arc::new(InMemoryIdentityStore::new());
        let mut record = IdentityRecord::new(
            "ledger@example.com".to_string(),
            "Ledger".to_string(),
            None,
            plan,
            keys::fingerprint_hex("bm_ledger"),
            "bm_ledge".to_string(),
            now,
        );
        record.usage = usage;
        let id = record.id;
        store.insert(record).await.unwrap();

        let clock = ManualClock::new(now);
        (MonthlyLedger::new(store, clock.clone()), id, clock)
    }

    #[tokio::test]
    async fn test_month_rollover_restores_full_allowance() {
        // 87 used against a ceiling of 100, last reset in the previous month
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let usage = UsageCounters {
            lifetime: 87,
            month: 87,
            last_reset_year: 2024,
            last_reset_month: 2,
        };
        let (ledger, id, _) = ledger_with_identity(usage, PlanTier::Base, now).await;

        let standing = ledger.remaining(id, PlanTier::Base).await.unwrap();
        assert_eq!(standing.remaining, 100);
        assert_eq!(standing.used_this_month, 0);
        // Lifetime survives the rollover
        assert_eq!(standing.lifetime, 87);
    }

    #[tokio::test]
    async fn test_rollover_happens_once_per_transition() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let usage = UsageCounters {
            lifetime: 10,
            month: 10,
            last_reset_year: 2024,
            last_reset_month: 2,
        };
        let (ledger, id, _) = ledger_with_identity(usage, PlanTier::Base, now).await;

        ledger.remaining(id, PlanTier::Base).await.unwrap();
        ledger.record_usage(id, PlanTier::Base).await.unwrap();
        let standing = ledger.remaining(id, PlanTier::Base).await.unwrap();

        // A second access in the same month must not reset again
        assert_eq!(standing.used_this_month, 1);
        assert_eq!(standing.remaining, 99);
    }

    #[tokio::test]
    async fn test_record_usage_bumps_both_counters() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let usage = UsageCounters {
            lifetime: 500,
            month: 40,
            last_reset_year: 2024,
            last_reset_month: 5,
        };
        let (ledger, id, _) = ledger_with_identity(usage, PlanTier::Pro, now).await;

        let standing = ledger.record_usage(id, PlanTier::Pro).await.unwrap();
        assert_eq!(standing.used_this_month, 41);
        assert_eq!(standing.lifetime, 501);
        assert_eq!(standing.remaining, 1_000 - 41);
    }

    #[tokio::test]
    async fn test_resets_at_points_at_next_month() {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 18, 30, 0).unwrap();
        let usage = UsageCounters::new(2024, 12);
        let (ledger, id, _) = ledger_with_identity(usage, PlanTier::Base, now).await;

        let standing = ledger.remaining(id, PlanTier::Base).await.unwrap();
        assert_eq!(
            standing.resets_at,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_remaining_saturates_at_zero() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let usage = UsageCounters {
            lifetime: 120,
            month: 120,
            last_reset_year: 2024,
            last_reset_month: 5,
        };
        let (ledger, id, _) = ledger_with_identity(usage, PlanTier::Base, now).await;

        let standing = ledger.remaining(id, PlanTier::Base).await.unwrap();
        assert_eq!(standing.remaining, 0);
    }
}
