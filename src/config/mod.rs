use crate::auth::PlanTier;
use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Credential resolution configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Admission tier ceilings and timeouts
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Redis configuration for the distributed daily quota.
    /// When absent the quota falls back to a process-local counter store.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Credential resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub header: String,
    /// Query parameter fallback for the API key
    #[serde(default = "default_api_key_param")]
    pub query_param: String,
    /// Well-known demo key resolving to a reserved identity (rotation refused).
    /// Set to null to disable the demo identity entirely.
    #[serde(default = "default_demo_key")]
    pub demo_key: Option<String>,
    /// Plan assigned to new signups
    #[serde(default = "default_signup_plan")]
    pub signup_plan: PlanTier,
}

/// Admission tier ceilings and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-address fixed-window ceiling
    #[serde(default = "default_window_requests")]
    pub window_requests: u32,
    /// Per-address window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Daily ceiling for elevated-plan keys
    #[serde(default = "default_daily_requests")]
    pub daily_requests: u64,
    /// Upper bound on any counter-store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Key prefix for daily quota buckets
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_api_key_param() -> String {
    "api_key".to_string()
}

fn default_demo_key() -> Option<String> {
    Some("test-key-123".to_string())
}

fn default_signup_plan() -> PlanTier {
    PlanTier::Base
}

fn default_window_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    3600
}

fn default_daily_requests() -> u64 {
    1000
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_redis_prefix() -> String {
    "mentions:quota:".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_api_key_header(),
            query_param: default_api_key_param(),
            demo_key: default_demo_key(),
            signup_plan: default_signup_plan(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            window_requests: default_window_requests(),
            window_secs: default_window_secs(),
            daily_requests: default_daily_requests(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ApiError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.window_requests == 0 {
            return Err(ApiError::Config(
                "limits.window_requests must be > 0".to_string(),
            ));
        }
        if self.limits.window_secs == 0 {
            return Err(ApiError::Config(
                "limits.window_secs must be > 0".to_string(),
            ));
        }
        if self.limits.daily_requests == 0 {
            return Err(ApiError::Config(
                "limits.daily_requests must be > 0".to_string(),
            ));
        }
        if self.limits.store_timeout_ms == 0 {
            return Err(ApiError::Config(
                "limits.store_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.auth.header.is_empty() {
            return Err(ApiError::Config("auth.header cannot be empty".to_string()));
        }

        if let Some(redis) = &self.redis {
            if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                return Err(ApiError::Config(format!(
                    "redis.url must start with redis:// or rediss://, got: {}",
                    redis.url
                )));
            }
        }

        Ok(())
    }

    /// Create a default configuration for testing
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            redis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

auth:
  header: "X-API-Key"
  demo_key: "test-key-123"

limits:
  window_requests: 60
  window_secs: 3600
  daily_requests: 1000

redis:
  url: "redis://localhost:6379"
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.window_requests, 60);
        assert_eq!(config.limits.daily_requests, 1000);
        assert_eq!(
            config.redis.as_ref().unwrap().prefix,
            "mentions:quota:".to_string()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.header, "X-API-Key");
        assert_eq!(config.auth.query_param, "api_key");
        assert_eq!(config.auth.demo_key.as_deref(), Some("test-key-123"));
        assert_eq!(config.auth.signup_plan, PlanTier::Base);
        assert_eq!(config.limits.window_requests, 60);
        assert_eq!(config.limits.window_secs, 3600);
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_validate_zero_window() {
        let yaml = r#"
limits:
  window_requests: 0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_redis_url() {
        let yaml = r#"
redis:
  url: "http://localhost:6379"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_demo_key_can_be_disabled() {
        let yaml = r#"
auth:
  demo_key: null
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.auth.demo_key.is_none());
    }
}
