use serde::{Deserialize, Serialize};

/// Behavior when a tier's backing store is unreachable.
///
/// Policy is deliberately per tier, not global: identity resolution fails
/// closed, while the daily quota and the monthly ledger fail open so an
/// infrastructure blip in a counter store never takes the service down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request and log the fault.
    Open,
    /// Deny the request as if the tier's ceiling were exceeded.
    Closed,
}

/// Decision from the process-local address window.
#[derive(Debug, Clone, Copy)]
pub struct WindowDecision {
    pub allowed: bool,
    /// Requests left in the current window (0 when denied)
    pub remaining: u32,
    /// Seconds until the window reopens
    pub retry_after: u64,
}

/// Decision from the distributed daily quota, carrying everything the
/// response headers disclose.
#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Daily ceiling
    pub limit: u64,
    /// Requests left today (0 when denied)
    pub remaining: u64,
    /// Unix seconds of the next UTC midnight
    pub reset_at: i64,
    /// Seconds until the bucket expires; set on denial
    pub retry_after: Option<u64>,
}

impl QuotaDecision {
    /// Build an allowed decision from a post-increment count.
    pub fn allowed(count: u64, limit: u64, reset_at: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
            retry_after: None,
        }
    }

    /// Build a denied decision.
    pub fn denied(limit: u64, reset_at: i64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after),
        }
    }
}
