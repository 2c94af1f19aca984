// src/storage/redis_store.rs
//! Redis-backed revocation store.
//!
//! Each revocation is one `PSETEX <prefix><jti> <ttl-ms> 1`; lookups are a
//! single `EXISTS`. Redis evicts records when their TTL runs out, so the
//! service never has to.
//!
//! # Failure Mode
//! Connection and command errors surface as `StoreError::Unavailable`.
//! Callers choose whether to fail closed.

use crate::error::StoreError;
use crate::storage::revocation_store::{revocation_key, RevocationStore, REVOKED_SENTINEL};
use async_trait::async_trait;
use log::debug;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// Revocation store over a shared, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisRevocationStore {
    /// Multiplexed connection; cloning shares it
    connection: ConnectionManager,
    /// Prepended to every credential id
    prefix: String,
}

impl RedisRevocationStore {
    /// Connects to Redis at `url` (e.g. `redis://:password@localhost:6379/0`).
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` if the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(RedisRevocationStore {
            connection,
            prefix: prefix.to_string(),
        })
    }

    /// Round-trips a `PING`, used at startup to report connectivity.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// `PSETEX` expiry for `ttl`, or `None` when nothing should be written.
///
/// PSETEX rejects 0, and sub-millisecond remainders round down to it.
fn expiry_millis(ttl: Duration) -> Option<u64> {
    u64::try_from(ttl.as_millis()).ok().filter(|millis| *millis > 0)
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, credential_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let Some(millis) = expiry_millis(ttl) else {
            return Ok(());
        };

        let key = revocation_key(&self.prefix, credential_id);
        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(&key, REVOKED_SENTINEL, millis).await?;
        debug!("Revoked credential {} with TTL {}ms, key {}", credential_id, millis, key);
        Ok(())
    }

    async fn is_revoked(&self, credential_id: &str) -> Result<bool, StoreError> {
        let key = revocation_key(&self.prefix, credential_id);
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(Duration::from_secs(900)), Some(900_000));
        assert_eq!(expiry_millis(Duration::from_millis(1)), Some(1));
        assert_eq!(expiry_millis(Duration::from_micros(999)), None);
        assert_eq!(expiry_millis(Duration::ZERO), None);
    }
}
