//! Durable identity records behind a small store interface.
//!
//! The admission core only ever talks to [`IdentityStore`]; the bundled
//! implementation keeps records in process memory behind a `tokio` RwLock
//! with secondary indexes for fingerprint, legacy plaintext key and email.
//! A database-backed implementation plugs in behind the same trait.

use crate::auth::PlanTier;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifetime and current-month usage embedded in an identity record.
///
/// `month` resets exactly once per distinct (year, month) transition,
/// detected lazily inside [`IdentityStore::update_usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCounters {
    /// Requests served over the identity's lifetime
    pub lifetime: u64,
    /// Requests served in the month of `last_reset`
    pub month: u64,
    /// Year of the last month rollover
    pub last_reset_year: i32,
    /// Month (1-12) of the last month rollover
    pub last_reset_month: u32,
}

impl UsageCounters {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            lifetime: 0,
            month: 0,
            last_reset_year: year,
            last_reset_month: month,
        }
    }
}

/// A caller's durable record.
///
/// `fingerprint` is the sha256 of the raw key; `legacy_key` holds a plaintext
/// credential from the pre-fingerprint scheme until lazy migration clears it.
/// The raw key itself is never stored.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub plan: PlanTier,
    pub fingerprint: Option<String>,
    pub key_prefix: String,
    pub legacy_key: Option<String>,
    /// Reserved identities (the demo key) refuse rotation.
    pub reserved: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub key_rotated_at: DateTime<Utc>,
    pub usage: UsageCounters,
}

impl IdentityRecord {
    /// Build a fresh record at signup time.
    pub fn new(
        email: String,
        name: String,
        company: Option<String>,
        plan: PlanTier,
        fingerprint: String,
        key_prefix: String,
        now: DateTime<Utc>,
    ) -> Self {
        use chrono::Datelike;
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            company,
            plan,
            fingerprint: Some(fingerprint),
            key_prefix,
            legacy_key: None,
            reserved: false,
            active: true,
            created_at: now,
            key_rotated_at: now,
            usage: UsageCounters::new(now.year(), now.month()),
        }
    }
}

/// Credential-to-identity lookup backed by durable storage.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an active identity by key fingerprint.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<IdentityRecord>>;

    /// Look up an active identity still keyed by a legacy plaintext credential.
    async fn find_by_legacy_key(&self, raw_key: &str) -> Result<Option<IdentityRecord>>;

    /// Fetch a record by id regardless of credential scheme.
    async fn fetch(&self, id: Uuid) -> Result<Option<IdentityRecord>>;

    /// Insert a new record. Fails with `DuplicateAccount` on email collision.
    async fn insert(&self, record: IdentityRecord) -> Result<()>;

    /// Persist a lazy migration: set the fingerprint, clear the legacy key.
    async fn apply_migration(&self, id: Uuid, fingerprint: &str, key_prefix: &str) -> Result<()>;

    /// Atomically replace the fingerprint and prefix on key rotation.
    /// The old fingerprint stops resolving as soon as this returns.
    async fn apply_rotation(
        &self,
        id: Uuid,
        fingerprint: &str,
        key_prefix: &str,
        rotated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically apply lazy month rollover for (`year`, `month`) and, when
    /// `increment` is set, bump both lifetime and month counters. Returns the
    /// counters after the update.
    async fn update_usage(
        &self,
        id: Uuid,
        year: i32,
        month: u32,
        increment: bool,
    ) -> Result<UsageCounters>;

    /// Number of stored identities (health reporting).
    async fn count(&self) -> Result<usize>;
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, IdentityRecord>,
    fingerprint_index: HashMap<String, Uuid>,
    legacy_index: HashMap<String, Uuid>,
    email_index: HashMap<String, Uuid>,
}

/// In-memory identity store.
///
/// All mutations take the write lock, which also serializes usage updates per
/// identity (single-writer, so read-modify-write on the counters is safe).
#[derive(Default)]
pub struct InMemoryIdentityStore {
    inner: RwLock<Inner>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<IdentityRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .fingerprint_index
            .get(fingerprint)
            .and_then(|id| inner.by_id.get(id))
            .filter(|record| record.active)
            .cloned())
    }

    async fn find_by_legacy_key(&self, raw_key: &str) -> Result<Option<IdentityRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .legacy_index
            .get(raw_key)
            .and_then(|id| inner.by_id.get(id))
            .filter(|record| record.active)
            .cloned())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<IdentityRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn insert(&self, record: IdentityRecord) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.email_index.contains_key(&record.email) {
            return Err(ApiError::DuplicateAccount("Email".to_string()));
        }
        if let Some(fp) = &record.fingerprint {
            if inner.fingerprint_index.contains_key(fp) {
                return Err(ApiError::Internal(
                    "fingerprint collision on insert".to_string(),
                ));
            }
        }

        let id = record.id;
        inner.email_index.insert(record.email.clone(), id);
        if let Some(fp) = &record.fingerprint {
            inner.fingerprint_index.insert(fp.clone(), id);
        }
        if let Some(legacy) = &record.legacy_key {
            inner.legacy_index.insert(legacy.clone(), id);
        }
        inner.by_id.insert(id, record);
        Ok(())
    }

    async fn apply_migration(&self, id: Uuid, fingerprint: &str, key_prefix: &str) -> Result<()> {
        let mut inner = self.inner.write().await;

        let record = inner.by_id.get_mut(&id).ok_or(ApiError::UnknownIdentity)?;
        let old_legacy = record.legacy_key.take();
        record.fingerprint = Some(fingerprint.to_string());
        record.key_prefix = key_prefix.to_string();

        if let Some(legacy) = old_legacy {
            inner.legacy_index.remove(&legacy);
        }
        inner.fingerprint_index.insert(fingerprint.to_string(), id);
        Ok(())
    }

    async fn apply_rotation(
        &self,
        id: Uuid,
        fingerprint: &str,
        key_prefix: &str,
        rotated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;

        let record = inner.by_id.get_mut(&id).ok_or(ApiError::UnknownIdentity)?;
        let old_fingerprint = record.fingerprint.replace(fingerprint.to_string());
        record.key_prefix = key_prefix.to_string();
        record.key_rotated_at = rotated_at;

        if let Some(old) = old_fingerprint {
            inner.fingerprint_index.remove(&old);
        }
        inner.fingerprint_index.insert(fingerprint.to_string(), id);
        Ok(())
    }

    async fn update_usage(
        &self,
        id: Uuid,
        year: i32,
        month: u32,
        increment: bool,
    ) -> Result<UsageCounters> {
        let mut inner = self.inner.write().await;

        let record = inner.by_id.get_mut(&id).ok_or(ApiError::UnknownIdentity)?;
        let usage = &mut record.usage;

        if usage.last_reset_year != year || usage.last_reset_month != month {
            usage.month = 0;
            usage.last_reset_year = year;
            usage.last_reset_month = month;
        }
        if increment {
            usage.month += 1;
            usage.lifetime += 1;
        }
        Ok(*usage)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().await.by_id.len())
    }
}
