use super::lua_scripts::DAILY_QUOTA_SCRIPT;
use super::store::CounterStore;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::debug;

/// Redis-backed counter store shared across all process instances.
///
/// Correctness of the quota tier rests entirely on the atomicity of the
/// bundled Lua script; no local locking is needed. Every call is bounded by
/// `timeout` and surfaces as `StoreUnavailable` on failure, which the daily
/// quota converts per its failure policy.
pub struct RedisCounterStore {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Connect to Redis. Fails if the initial connection cannot be
    /// established; callers decide whether to fall back to a local store.
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ApiError::Config(format!("Failed to create Redis client: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ApiError::StoreUnavailable(format!("Redis connect: {}", e)))?;

        Ok(Self {
            connection,
            timeout,
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<(u64, u64)> {
        let script = Script::new(DAILY_QUOTA_SCRIPT);
        let mut connection = self.connection.clone();

        let mut invocation = script.key(key);
        invocation.arg(ttl_secs);
        let invocation = invocation.invoke_async::<_, Vec<i64>>(&mut connection);

        let result = tokio::time::timeout(self.timeout, invocation)
            .await
            .map_err(|_| ApiError::StoreUnavailable("Redis call timed out".to_string()))?
            .map_err(|e| ApiError::StoreUnavailable(format!("Redis error: {}", e)))?;

        if result.len() != 2 {
            return Err(ApiError::StoreUnavailable(format!(
                "unexpected script reply: {:?}",
                result
            )));
        }

        let count = result[0].max(0) as u64;
        let ttl = result[1].max(0) as u64;
        debug!(key, count, ttl, "daily quota bucket incremented");
        Ok((count, ttl))
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        let ping_cmd = redis::cmd("PING");
        let ping = ping_cmd.query_async::<_, ()>(&mut connection);

        tokio::time::timeout(self.timeout, ping)
            .await
            .map_err(|_| ApiError::StoreUnavailable("Redis ping timed out".to_string()))?
            .map_err(|e| ApiError::StoreUnavailable(format!("Redis error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance and are ignored by
    // default. Run with: cargo test -- --ignored

    async fn connect() -> Option<RedisCounterStore> {
        RedisCounterStore::connect("redis://127.0.0.1:6379", Duration::from_secs(2))
            .await
            .ok()
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_increment_and_expiry() {
        let store = connect().await.expect("Failed to connect to Redis");
        let key = format!("mentions:quota:test:{}", uuid::Uuid::new_v4());

        let (count, ttl) = store.increment_with_expiry(&key, 120).await.unwrap();
        assert_eq!(count, 1);
        assert!(ttl > 0 && ttl <= 120);

        let (count, _) = store.increment_with_expiry(&key, 120).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_ping() {
        let store = connect().await.expect("Failed to connect to Redis");
        assert!(store.ping().await.is_ok());
    }
}
