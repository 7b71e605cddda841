//! Credential resolution and identity lifecycle.
//!
//! Maps a presented API key to a stable [`Identity`] via its sha256
//! fingerprint, performs best-effort lazy migration of legacy plaintext
//! credentials, and owns signup and key rotation. The raw key is never
//! persisted, logged or attached to a request; only the fingerprint and an
//! 8-character display prefix survive resolution.

pub mod keys;
pub mod store;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{ApiError, Result};
use crate::metrics;
use axum::http::HeaderMap;
use chrono::{DateTime, Datelike, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::{IdentityRecord, IdentityStore};
use tracing::{debug, warn};
use uuid::Uuid;

/// Plan tiers in ascending order of entitlement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Base,
    Pro,
    Enterprise,
}

/// Ordered tier -> monthly ceiling table. Adding a tier is a data change,
/// not a logic change.
pub const MONTHLY_CEILINGS: [(PlanTier, u64); 3] = [
    (PlanTier::Base, 100),
    (PlanTier::Pro, 1_000),
    (PlanTier::Enterprise, 10_000),
];

impl PlanTier {
    /// Elevated tiers are subject to the distributed daily quota;
    /// `Base` is bounded by the address window and the monthly ledger only.
    pub fn is_elevated(self) -> bool {
        self > PlanTier::Base
    }

    pub fn monthly_ceiling(self) -> u64 {
        MONTHLY_CEILINGS
            .iter()
            .find(|(tier, _)| *tier == self)
            .map(|(_, ceiling)| *ceiling)
            .expect("every tier has a ceiling")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Base => "base",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

/// Resolved caller identity, attached to the request scope so later gates
/// and handlers never re-resolve the credential.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub plan: PlanTier,
    pub fingerprint: String,
    pub key_prefix: String,
}

impl Identity {
    fn from_record(record: &IdentityRecord, fingerprint: String) -> Self {
        Self {
            id: record.id,
            plan: record.plan,
            fingerprint,
            key_prefix: record.key_prefix.clone(),
        }
    }
}

/// Result of a signup: the stored record plus the raw key, shown exactly once.
#[derive(Debug)]
pub struct SignupOutcome {
    pub record: IdentityRecord,
    pub api_key: SecretString,
}

/// Result of a rotation: the new raw key, shown exactly once.
#[derive(Debug)]
pub struct RotatedKey {
    pub api_key: SecretString,
    pub key_prefix: String,
    pub rotated_at: DateTime<Utc>,
}

/// Credential resolution service.
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    header_name: String,
    query_param: String,
    signup_plan: PlanTier,
}

impl AuthService {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            header_name: config.header.clone(),
            query_param: config.query_param.clone(),
            signup_plan: config.signup_plan,
        }
    }

    /// Pull the raw credential from the dedicated header, falling back to the
    /// query parameter.
    fn extract_credential(&self, headers: &HeaderMap, query: Option<&str>) -> Option<SecretString> {
        if let Some(value) = headers.get(&self.header_name) {
            if let Ok(raw) = value.to_str() {
                if !raw.is_empty() {
                    return Some(SecretString::new(raw.to_string()));
                }
            }
        }
        query
            .and_then(|q| query_value(q, &self.query_param))
            .map(SecretString::new)
    }

    /// Resolve a presented credential to an identity.
    ///
    /// Fails closed: a store fault reads as an invalid credential rather than
    /// surfacing as a 5xx, and the message never distinguishes unknown from
    /// malformed keys.
    pub async fn resolve(&self, headers: &HeaderMap, query: Option<&str>) -> Result<Identity> {
        let raw = self
            .extract_credential(headers, query)
            .ok_or(ApiError::CredentialMissing)?;
        let fingerprint = keys::fingerprint_secret(&raw);

        match self.store.find_by_fingerprint(&fingerprint).await {
            Ok(Some(record)) => {
                metrics::record_auth_attempt(true);
                return Ok(Identity::from_record(&record, fingerprint));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "identity store fault during resolution, failing closed");
                metrics::record_auth_attempt(false);
                return Err(ApiError::CredentialInvalid);
            }
        }

        // Legacy plaintext scheme: migrate to the fingerprint scheme in
        // passing. The migration write is best-effort; a failure must not
        // fail the request (it is retried on the next resolution).
        match self.store.find_by_legacy_key(raw.expose_secret()).await {
            Ok(Some(record)) => {
                let key_prefix = keys::prefix_of_secret(&raw);
                if let Err(e) = self
                    .store
                    .apply_migration(record.id, &fingerprint, &key_prefix)
                    .await
                {
                    warn!(
                        identity = %record.id,
                        error = %e,
                        "legacy credential migration failed, will retry on a later request"
                    );
                } else {
                    debug!(identity = %record.id, "migrated legacy credential to fingerprint scheme");
                }
                metrics::record_auth_attempt(true);
                Ok(Identity {
                    key_prefix,
                    ..Identity::from_record(&record, fingerprint)
                })
            }
            Ok(None) => {
                metrics::record_auth_attempt(false);
                Err(ApiError::CredentialInvalid)
            }
            Err(e) => {
                warn!(error = %e, "identity store fault during legacy lookup, failing closed");
                metrics::record_auth_attempt(false);
                Err(ApiError::CredentialInvalid)
            }
        }
    }

    /// Create a new identity and mint its key.
    pub async fn signup(
        &self,
        email: &str,
        name: &str,
        company: Option<String>,
    ) -> Result<SignupOutcome> {
        let email = email.trim().to_lowercase();
        let name = name.trim().to_string();
        if email.is_empty() || name.is_empty() {
            return Err(ApiError::Validation("Name and email required".to_string()));
        }

        let api_key = keys::generate_key();
        let record = IdentityRecord::new(
            email,
            name,
            company.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            self.signup_plan,
            keys::fingerprint_secret(&api_key),
            keys::prefix_of_secret(&api_key),
            self.clock.now(),
        );
        self.store.insert(record.clone()).await?;
        Ok(SignupOutcome { record, api_key })
    }

    /// Rotate an identity's credential. The old fingerprint stops resolving
    /// the moment this returns; the new raw key is returned exactly once.
    pub async fn rotate(&self, identity: &Identity) -> Result<RotatedKey> {
        let record = self
            .store
            .fetch(identity.id)
            .await?
            .ok_or(ApiError::UnknownIdentity)?;
        if record.reserved {
            return Err(ApiError::RotationForbidden);
        }

        let api_key = keys::generate_key();
        let fingerprint = keys::fingerprint_secret(&api_key);
        let key_prefix = keys::prefix_of_secret(&api_key);
        let rotated_at = self.clock.now();

        self.store
            .apply_rotation(record.id, &fingerprint, &key_prefix, rotated_at)
            .await?;

        Ok(RotatedKey {
            api_key,
            key_prefix,
            rotated_at,
        })
    }

    /// Seed the reserved demo identity reachable via a well-known key.
    /// Idempotent: an existing demo account is left untouched.
    pub async fn seed_demo(&self, raw_key: &str) -> Result<()> {
        let now = self.clock.now();
        let record = IdentityRecord {
            id: Uuid::new_v4(),
            email: "demo@mention-gateway.dev".to_string(),
            name: "Demo User".to_string(),
            company: Some("Mention Gateway".to_string()),
            plan: PlanTier::Base,
            fingerprint: Some(keys::fingerprint_hex(raw_key)),
            key_prefix: keys::display_prefix(raw_key),
            legacy_key: None,
            reserved: true,
            active: true,
            created_at: now,
            key_rotated_at: now,
            usage: store::UsageCounters::new(now.year(), now.month()),
        };
        match self.store.insert(record).await {
            Ok(()) => Ok(()),
            Err(ApiError::DuplicateAccount(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn query_value(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use store::InMemoryIdentityStore;

    fn service() -> (AuthService, Arc<InMemoryIdentityStore>) {
        let store = Arc::new(InMemoryIdentityStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap());
        let service = AuthService::new(store.clone(), clock, &AuthConfig::default());
        (service, store)
    }

    fn headers_with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", key.parse().unwrap());
        headers
    }

    #[test]
    fn test_plan_tier_ordering_and_ceilings() {
        assert!(PlanTier::Base < PlanTier::Pro);
        assert!(PlanTier::Pro < PlanTier::Enterprise);
        assert!(!PlanTier::Base.is_elevated());
        assert!(PlanTier::Pro.is_elevated());
        assert_eq!(PlanTier::Base.monthly_ceiling(), 100);
        assert_eq!(PlanTier::Enterprise.monthly_ceiling(), 10_000);
    }

    #[tokio::test]
    async fn test_resolve_missing_credential() {
        let (service, _) = service();
        let err = service.resolve(&HeaderMap::new(), None).await.unwrap_err();
        assert!(matches!(err, ApiError::CredentialMissing));
    }

    #[tokio::test]
    async fn test_resolve_unknown_credential() {
        let (service, _) = service();
        let err = service
            .resolve(&headers_with_key("bm_nobody"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::CredentialInvalid));
    }

    #[tokio::test]
    async fn test_resolve_via_query_param_fallback() {
        let (service, _) = service();
        service.seed_demo("test-key-123").await.unwrap();

        let identity = service
            .resolve(&HeaderMap::new(), Some("keyword=rust&api_key=test-key-123"))
            .await
            .unwrap();
        assert_eq!(identity.key_prefix, "test-key");
    }

    #[tokio::test]
    async fn test_signup_then_resolve() {
        let (service, _) = service();
        let outcome = service
            .signup("User@Example.com ", "Ada", Some("Initech".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.record.email, "user@example.com");

        let raw = outcome.api_key.expose_secret().clone();
        let identity = service
            .resolve(&headers_with_key(&raw), None)
            .await
            .unwrap();
        assert_eq!(identity.id, outcome.record.id);
        assert_eq!(identity.fingerprint, keys::fingerprint_hex(&raw));
    }

    #[tokio::test]
    async fn test_signup_duplicate_email() {
        let (service, _) = service();
        service.signup("dup@example.com", "One", None).await.unwrap();
        let err = service
            .signup("dup@example.com", "Two", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateAccount(_)));
    }

    #[tokio::test]
    async fn test_lazy_migration_runs_once() {
        let (service, store) = service();

        let mut record = IdentityRecord::new(
            "legacy@example.com".to_string(),
            "Legacy".to_string(),
            None,
            PlanTier::Pro,
            String::new(),
            keys::display_prefix("old-plaintext-key"),
            Utc::now(),
        );
        record.fingerprint = None;
        record.legacy_key = Some("old-plaintext-key".to_string());
        let id = record.id;
        store.insert(record).await.unwrap();

        // First resolution migrates
        let identity = service
            .resolve(&headers_with_key("old-plaintext-key"), None)
            .await
            .unwrap();
        assert_eq!(identity.id, id);

        let migrated = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(migrated.legacy_key, None);
        assert_eq!(
            migrated.fingerprint.as_deref(),
            Some(keys::fingerprint_hex("old-plaintext-key").as_str())
        );

        // Second resolution succeeds through the fingerprint path
        let again = service
            .resolve(&headers_with_key("old-plaintext-key"), None)
            .await
            .unwrap();
        assert_eq!(again.id, id);
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_key_immediately() {
        let (service, _) = service();
        let outcome = service.signup("rot@example.com", "Rot", None).await.unwrap();
        let old_raw = outcome.api_key.expose_secret().clone();

        let identity = service
            .resolve(&headers_with_key(&old_raw), None)
            .await
            .unwrap();
        let rotated = service.rotate(&identity).await.unwrap();

        // Old credential no longer resolves
        let err = service
            .resolve(&headers_with_key(&old_raw), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::CredentialInvalid));

        // New credential resolves to the same identity
        let new_raw = rotated.api_key.expose_secret().clone();
        let resolved = service
            .resolve(&headers_with_key(&new_raw), None)
            .await
            .unwrap();
        assert_eq!(resolved.id, identity.id);
        assert_eq!(resolved.key_prefix, rotated.key_prefix);
    }

    #[tokio::test]
    async fn test_rotation_forbidden_for_demo_identity() {
        let (service, _) = service();
        service.seed_demo("test-key-123").await.unwrap();

        let identity = service
            .resolve(&headers_with_key("test-key-123"), None)
            .await
            .unwrap();
        let err = service.rotate(&identity).await.unwrap_err();
        assert!(matches!(err, ApiError::RotationForbidden));
    }

    #[test]
    fn test_query_value_parsing() {
        assert_eq!(
            query_value("a=1&api_key=bm_x&b=2", "api_key"),
            Some("bm_x".to_string())
        );
        assert_eq!(query_value("api_key=", "api_key"), None);
        assert_eq!(query_value("other=1", "api_key"), None);
    }
}
