//! HTTP surface: application state and handlers.
//!
//! Handlers downstream of the admission pipeline read the resolved
//! [`Identity`] from request extensions and never see the raw credential.

use crate::auth::store::IdentityStore;
use crate::auth::{AuthService, Identity};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{ApiError, Result};
use crate::rate_limit::{CounterStore, DailyQuota, FailurePolicy, WindowLimiter};
use crate::search::SearchBackend;
use crate::usage::MonthlyLedger;
use axum::{
    extract::{Extension, Query, State},
    Json,
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub identity_store: Arc<dyn IdentityStore>,
    pub counter_store: Arc<dyn CounterStore>,
    pub window: Arc<WindowLimiter>,
    pub daily: Arc<DailyQuota>,
    pub ledger: Arc<MonthlyLedger>,
    pub search: Arc<dyn SearchBackend>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Assemble the admission tiers around the injected stores and clock.
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        identity_store: Arc<dyn IdentityStore>,
        counter_store: Arc<dyn CounterStore>,
        search: Arc<dyn SearchBackend>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            identity_store.clone(),
            clock.clone(),
            &config.auth,
        ));
        let window = Arc::new(WindowLimiter::new(
            config.limits.window_requests,
            config.limits.window_secs,
            clock.clone(),
        ));
        let quota_prefix = config
            .redis
            .as_ref()
            .map(|redis| redis.prefix.clone())
            .unwrap_or_else(|| "mentions:quota:".to_string());
        let daily = Arc::new(DailyQuota::new(
            counter_store.clone(),
            clock.clone(),
            quota_prefix,
            config.limits.daily_requests,
            FailurePolicy::Open,
        ));
        let ledger = Arc::new(MonthlyLedger::new(identity_store.clone(), clock.clone()));

        Self {
            config: Arc::new(config),
            auth,
            identity_store,
            counter_store,
            window,
            daily,
            ledger,
            search,
            clock,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub keyword: Option<String>,
}

/// `POST /api/signup` — create an identity; the raw key appears here once.
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<Value>> {
    let outcome = state
        .auth
        .signup(&body.email, &body.name, body.company)
        .await?;
    let ceiling = outcome.record.plan.monthly_ceiling();

    info!(identity = %outcome.record.id, "new signup");

    Ok(Json(json!({
        "success": true,
        "message": "Welcome to Mention Gateway!",
        "apiKey": outcome.api_key.expose_secret(),
        "user": {
            "name": outcome.record.name,
            "email": outcome.record.email,
            "plan": outcome.record.plan.as_str(),
        },
        "usage": {
            "searches": 0,
            "searchesThisMonth": 0,
            "limit": ceiling,
            "remaining": ceiling,
            "reset": "monthly",
        },
    })))
}

/// `POST /api/keys/rotate` — swap the caller's credential; the new raw key
/// appears here once and cannot be recovered afterward.
pub async fn rotate_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>> {
    let rotated = state.auth.rotate(&identity).await?;

    info!(identity = %identity.id, "credential rotated");

    Ok(Json(json!({
        "apiKey": rotated.api_key.expose_secret(),
        "prefix": rotated.key_prefix,
        "rotatedAt": rotated.rotated_at.to_rfc3339(),
    })))
}

/// `GET /api/user` — profile plus usage summary.
pub async fn user_info(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>> {
    let record = state
        .identity_store
        .fetch(identity.id)
        .await?
        .ok_or(ApiError::UnknownIdentity)?;
    let standing = state.ledger.remaining(identity.id, identity.plan).await?;

    Ok(Json(json!({
        "user": {
            "userId": record.id,
            "name": record.name,
            "email": record.email,
            "company": record.company,
            "plan": record.plan.as_str(),
            "keyPrefix": record.key_prefix,
            "joined": record.created_at.to_rfc3339(),
        },
        "usage": {
            "totalSearches": standing.lifetime,
            "monthlySearches": standing.used_this_month,
            "limit": standing.ceiling,
            "remaining": standing.remaining,
        },
    })))
}

/// `GET /api/usage` — usage counters and the limits that apply to the caller.
pub async fn usage_info(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>> {
    let standing = state.ledger.remaining(identity.id, identity.plan).await?;
    let limits = &state.config.limits;

    Ok(Json(json!({
        "userId": identity.id,
        "plan": identity.plan.as_str(),
        "usage": {
            "totalSearches": standing.lifetime,
            "monthlySearches": standing.used_this_month,
            "limit": standing.ceiling,
            "remaining": standing.remaining,
            "resetsAt": standing.resets_at.to_rfc3339(),
        },
        "rateLimit": {
            "perAddressPerWindow": limits.window_requests,
            "windowSecs": limits.window_secs,
            "elevatedPerKeyPerDay": limits.daily_requests,
            "remaining": "See X-RateLimit-Remaining header",
        },
    })))
}

/// `GET /api/search` — the guarded endpoint; admission has already run.
pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>> {
    let keyword = params
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::Validation("Keyword required".to_string()))?;

    let results = state.search.search(keyword).await?;

    Ok(Json(json!({
        "plan": identity.plan.as_str(),
        "results": results,
    })))
}

/// `GET /health` — liveness plus store connectivity.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let identities = state.identity_store.count().await.unwrap_or(0);
    let counter_store = match state.counter_store.ping().await {
        Ok(()) => "connected",
        Err(_) => "unreachable",
    };

    // The counter store failing is degraded, not down: the daily quota
    // fails open and everything else keeps serving.
    let status = if counter_store == "connected" {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "timestamp": state.clock.now().to_rfc3339(),
        "identities": identities,
        "counterStore": counter_store,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::InMemoryIdentityStore;
    use crate::auth::PlanTier;
    use crate::clock::ManualClock;
    use crate::rate_limit::InMemoryCounterStore;
    use crate::search::StaticSearchBackend;
    use chrono::{TimeZone, Utc};

    fn test_state() -> AppState {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap());
        let identity_store = Arc::new(InMemoryIdentityStore::new());
        let counter_store = Arc::new(InMemoryCounterStore::new(clock.clone()));
        AppState::new(
            AppConfig::default_config(),
            clock,
            identity_store,
            counter_store,
            Arc::new(StaticSearchBackend),
        )
    }

    #[tokio::test]
    async fn test_signup_returns_key_once() {
        let state = test_state();
        let response = signup(
            State(state),
            Json(SignupRequest {
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                company: None,
            }),
        )
        .await
        .unwrap();

        let body = response.0;
        assert_eq!(body["success"], true);
        assert!(body["apiKey"].as_str().unwrap().starts_with("bm_"));
        assert_eq!(body["usage"]["limit"], 100);
    }

    #[tokio::test]
    async fn test_search_requires_keyword() {
        let state = test_state();
        let identity = Identity {
            id: uuid::Uuid::new_v4(),
            plan: PlanTier::Base,
            fingerprint: "fp".to_string(),
            key_prefix: "bm_test".to_string(),
        };

        let err = search(
            State(state),
            Extension(identity),
            Query(SearchParams { keyword: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_health_reports_counter_store() {
        let state = test_state();
        let body = health(State(state)).await.0;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["counterStore"], "connected");
    }
}
