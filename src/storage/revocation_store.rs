// src/storage/revocation_store.rs
//! Revocation records over an expiring key-value cache.
//!
//! A record says "credential `<jti>` is revoked" and lives exactly as long as
//! the credential itself would have. Once both lapse the record is gone and
//! nothing distinguishes the credential from one that was never revoked,
//! which is fine because its own `exp` already rejects it.
//!
//! The store owns expiry. Nothing in the engine sweeps old records.

use crate::error::StoreError;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Key prefix used by the original deployment; kept for cache compatibility.
pub const DEFAULT_KEY_PREFIX: &str = "blacklist:";

/// Sentinel stored under each revocation key. Presence is what matters.
pub const REVOKED_SENTINEL: &str = "1";

/// Builds the cache key for a credential id.
pub fn revocation_key(prefix: &str, credential_id: &str) -> String {
    format!("{}{}", prefix, credential_id)
}

/// Expiring presence records keyed by credential id.
///
/// Implementations must report backend failures as `StoreError` from
/// `is_revoked`, never as `Ok(false)`; treating an outage as "not revoked"
/// would switch revocation off for its duration.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Marks `credential_id` revoked for `ttl`. A zero `ttl` writes nothing.
    async fn revoke(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Whether an unexpired revocation record exists for `credential_id`.
    async fn is_revoked(&self, credential_id: &str) -> Result<bool, StoreError>;
}

/// Process-local revocation store.
///
/// Entries expire lazily: an expired entry is dropped when it is next looked
/// at, and every write sweeps expired entries so the map stays bounded by the
/// number of live revocations.
pub struct InMemoryRevocationStore {
    prefix: String,
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(prefix: &str) -> Self {
        InMemoryRevocationStore {
            prefix: prefix.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Time left on the record for `credential_id`, if one is live.
    #[cfg(test)]
    pub fn remaining_ttl(&self, credential_id: &str) -> Option<Duration> {
        let key = revocation_key(&self.prefix, credential_id);
        let now = Instant::now();
        self.entries
            .lock()
            .get(&key)
            .and_then(|deadline| deadline.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }

    /// Number of live records.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, deadline| *deadline > now);
        entries.len()
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let key = revocation_key(&self.prefix, credential_id);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, deadline| *deadline > now);
        debug!("Recording revocation {} for {:?}", key, ttl);
        entries.insert(key, now + ttl);
        Ok(())
    }

    async fn is_revoked(&self, credential_id: &str) -> Result<bool, StoreError> {
        let key = revocation_key(&self.prefix, credential_id);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(deadline) if *deadline > now => Ok(true),
            Some(_) => {
                entries.remove(&key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(revocation_key(DEFAULT_KEY_PREFIX, "abc"), "blacklist:abc");
        assert_eq!(revocation_key("revoked/", "abc"), "revoked/abc");
    }

    #[tokio::test]
    async fn test_revoke_then_query() {
        let store = InMemoryRevocationStore::new();
        assert!(!store.is_revoked("a").await.unwrap());

        store.revoke("a", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_revoked("a").await.unwrap());
        assert!(!store.is_revoked("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_noop() {
        let store = InMemoryRevocationStore::new();
        store.revoke("a", Duration::ZERO).await.unwrap();

        assert!(!store.is_revoked("a").await.unwrap());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_record_expires_on_its_own() {
        let store = InMemoryRevocationStore::new();
        store.revoke("a", Duration::from_millis(50)).await.unwrap();
        assert!(store.is_revoked("a").await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!store.is_revoked("a").await.unwrap());
        assert_eq!(store.remaining_ttl("a"), None);
    }

    #[tokio::test]
    async fn test_remaining_ttl_bounded_by_requested() {
        let store = InMemoryRevocationStore::new();
        store.revoke("a", Duration::from_secs(30)).await.unwrap();

        let left = store.remaining_ttl("a").unwrap();
        assert!(left <= Duration::from_secs(30));
        assert!(left > Duration::from_secs(29));
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let store = InMemoryRevocationStore::new();
        store.revoke("old", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        store.revoke("new", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
