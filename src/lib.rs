pub mod admission;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod search;
pub mod usage;

use crate::api::AppState;
use crate::auth::store::{IdentityStore, InMemoryIdentityStore};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::{ApiError, Result};
use crate::metrics::MetricsService;
use crate::rate_limit::{CounterStore, InMemoryCounterStore, RedisCounterStore};
use crate::search::StaticSearchBackend;
use axum::{
    middleware,
    routing::{get, post},
    Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Assemble the full route tree around an [`AppState`].
///
/// The guarded search route runs the complete admission pipeline; account
/// routes resolve the credential only; signup and health are open.
pub fn build_router(state: AppState, metrics_service: Option<MetricsService>) -> AxumRouter {
    let guarded = AxumRouter::new()
        .route("/api/search", get(api::search))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission::admit,
        ));

    let account = AxumRouter::new()
        .route("/api/user", get(api::user_info))
        .route("/api/usage", get(api::usage_info))
        .route("/api/keys/rotate", post(api::rotate_key))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission::require_identity,
        ));

    let mut app = AxumRouter::new()
        .route("/api/signup", post(api::signup))
        .route("/health", get(api::health))
        .merge(guarded)
        .merge(account);

    if let Some(service) = metrics_service {
        app = app.route(
            "/metrics",
            get(metrics::metrics_handler).with_state(service),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Initialize and run the server
pub async fn init_server(config: AppConfig) -> Result<()> {
    config.validate()?;

    info!("Starting Mention Gateway");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity_store: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new());
    let store_timeout = Duration::from_millis(config.limits.store_timeout_ms);

    let counter_store: Arc<dyn CounterStore> = match &config.redis {
        Some(redis) => match RedisCounterStore::connect(&redis.url, store_timeout).await {
            Ok(store) => {
                info!("Redis connection successful, daily quota uses the shared store");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Redis unavailable ({}), daily quota falls back to a process-local store",
                    e
                );
                Arc::new(InMemoryCounterStore::new(clock.clone()))
            }
        },
        None => {
            info!("No Redis configured, daily quota uses a process-local store");
            Arc::new(InMemoryCounterStore::new(clock.clone()))
        }
    };

    let state = AppState::new(
        config.clone(),
        clock,
        identity_store,
        counter_store,
        Arc::new(StaticSearchBackend),
    );

    if let Some(demo_key) = state.config.auth.demo_key.clone() {
        state.auth.seed_demo(&demo_key).await?;
        info!(
            prefix = %auth::keys::display_prefix(&demo_key),
            "demo identity seeded"
        );
    }

    let metrics_service = match MetricsService::new() {
        Ok(service) => Some(service),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let app = build_router(state, metrics_service);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ApiError::Io)?;

    info!("Gateway ready to accept connections");

    // ConnectInfo feeds the address-window tier
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mention_gateway=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
