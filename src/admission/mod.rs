//! The admission pipeline.
//!
//! One middleware orchestrates every tier in strict order: resolve the
//! credential, pass the process-local address window, pass the distributed
//! daily quota (elevated plans only), pass the monthly entitlement pre-gate,
//! run the handler, then count the served request against the monthly
//! ledger best-effort. Any denial short-circuits the rest of the pipeline,
//! including the usage increment.
//!
//! The resolved [`crate::auth::Identity`] is attached to the request
//! extensions so the handler and the post-hoc accounting never re-resolve
//! the credential.

use crate::api::AppState;
use crate::clock;
use crate::error::ApiError;
use crate::metrics;
use crate::rate_limit::QuotaDecision;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{debug, warn};

/// Full admission pipeline for the guarded search endpoint.
pub async fn admit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let query = request.uri().query().map(str::to_owned);

    // Tier 0: credential resolution (fails closed)
    let identity = match state.auth.resolve(request.headers(), query.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    // Tier 1: process-local address window, cheapest gate first
    let addr = client_ip(&request);
    let window = state.window.check(addr);
    if !window.allowed {
        metrics::record_tier_denied("window");
        return deny(ApiError::WindowLimitExceeded, window.retry_after, None);
    }

    // Tier 2: distributed daily quota, elevated plans only. A `None` here
    // means the store was unreachable and the tier's open policy applied.
    let mut quota = None;
    if identity.plan.is_elevated() {
        if let Some(decision) = state.daily.check(&identity.fingerprint).await {
            if !decision.allowed {
                let retry_after = decision.retry_after.unwrap_or(0);
                return deny(ApiError::DailyQuotaExceeded, retry_after, Some(&decision));
            }
            quota = Some(decision);
        }
    }

    // Tier 3: monthly entitlement pre-gate. Store faults fail open.
    match state.ledger.remaining(identity.id, identity.plan).await {
        Ok(standing) if standing.remaining == 0 => {
            metrics::record_tier_denied("monthly");
            let retry_after = clock::seconds_until_next_month(state.clock.now());
            return deny(ApiError::MonthlyEntitlementExceeded, retry_after, quota.as_ref());
        }
        Ok(_) => {}
        Err(e) => {
            metrics::record_store_failure("monthly_ledger");
            warn!(error = %e, "monthly ledger unavailable for pre-gate, failing open");
        }
    }

    debug!(
        identity = %identity.id,
        plan = identity.plan.as_str(),
        key_prefix = %identity.key_prefix,
        "request admitted"
    );

    let id = identity.id;
    let plan = identity.plan;
    request.extensions_mut().insert(identity);

    let mut response = next.run(request).await;

    if let Some(decision) = &quota {
        apply_quota_headers(response.headers_mut(), decision);
    }

    // Post-hoc accounting, best-effort: a ledger fault must not undo an
    // already-served request.
    if let Err(e) = state.ledger.record_usage(id, plan).await {
        metrics::record_store_failure("monthly_ledger");
        warn!(identity = %id, error = %e, "failed to record usage");
    }

    response
}

/// Credential-only gate for account endpoints (profile, usage, rotation).
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let query = request.uri().query().map(str::to_owned);
    match state.auth.resolve(request.headers(), query.as_deref()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Disclose remaining daily budget: RFC-style headers plus legacy-named
/// duplicates of the same three values.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &QuotaDecision) {
    let limit = HeaderValue::from_str(&decision.limit.to_string()).unwrap();
    let remaining = HeaderValue::from_str(&decision.remaining.to_string()).unwrap();
    let reset = HeaderValue::from_str(&decision.reset_at.to_string()).unwrap();

    headers.insert("RateLimit-Limit", limit.clone());
    headers.insert("RateLimit-Remaining", remaining.clone());
    headers.insert("RateLimit-Reset", reset.clone());
    headers.insert("X-RateLimit-Limit", limit);
    headers.insert("X-RateLimit-Remaining", remaining);
    headers.insert("X-RateLimit-Reset", reset);
}

fn deny(error: ApiError, retry_after: u64, quota: Option<&QuotaDecision>) -> Response {
    let mut response = error.into_response();
    response.headers_mut().insert(
        "Retry-After",
        HeaderValue::from_str(&retry_after.to_string()).unwrap(),
    );
    if let Some(decision) = quota {
        apply_quota_headers(response.headers_mut(), decision);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_apply_quota_headers_sets_both_conventions() {
        let mut headers = HeaderMap::new();
        let decision = QuotaDecision::allowed(1, 1000, 1_700_000_000);
        apply_quota_headers(&mut headers, &decision);

        assert_eq!(headers.get("RateLimit-Limit").unwrap(), "1000");
        assert_eq!(headers.get("RateLimit-Remaining").unwrap(), "999");
        assert_eq!(headers.get("RateLimit-Reset").unwrap(), "1700000000");
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "1000");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "999");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "1700000000");
    }

    #[test]
    fn test_deny_attaches_retry_after_and_quota() {
        let decision = QuotaDecision::denied(1000, 1_700_000_000, 3600);
        let response = deny(ApiError::DailyQuotaExceeded, 3600, Some(&decision));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "3600");
        assert_eq!(response.headers().get("RateLimit-Remaining").unwrap(), "0");
    }

    #[test]
    fn test_window_deny_has_no_quota_headers() {
        let response = deny(ApiError::WindowLimitExceeded, 120, None);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "120");
        assert!(response.headers().get("RateLimit-Limit").is_none());
    }
}
