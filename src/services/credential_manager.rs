// src/services/credential_manager.rs
//! Credential lifecycle: issue, verify, refresh, revoke.
//!
//! Credentials are self-contained. The only server-side state is one
//! short-lived revocation record per revoked credential, keyed by its `jti`,
//! so devices of the same user can be signed out independently.
//!
//! The manager is immutable after construction and safe to share across
//! any number of concurrent requests. It performs no retries and no logging;
//! every failure is returned as an [`AuthError`] for the caller to map.

use crate::error::AuthError;
use crate::models::claims::{Claims, CredentialType, IssuedCredential, TokenPair};
use crate::models::user::User;
use crate::services::credential_codec::CredentialCodec;
use crate::storage::revocation_store::RevocationStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of a successful revocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revocation {
    /// A record was written and lives for `ttl`.
    Recorded { credential_id: String, ttl: Duration },
    /// The credential had already expired; nothing was written.
    AlreadyExpired { credential_id: String },
}

/// Issues and checks session credentials.
pub struct CredentialManager {
    codec: CredentialCodec,
    revocations: Arc<dyn RevocationStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialManager {
    /// # Arguments
    /// * `codec` - Signs and parses credentials
    /// * `revocations` - Store consulted on every verification
    /// * `access_ttl` - Lifetime of access credentials (whole seconds)
    /// * `refresh_ttl` - Lifetime of refresh credentials (whole seconds)
    pub fn new(
        codec: CredentialCodec,
        revocations: Arc<dyn RevocationStore>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        CredentialManager {
            codec,
            revocations,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issues an access/refresh pair for `user`, each with its own fresh `jti`.
    pub fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        let access = self.mint(user.id, &user.username, &user.role, CredentialType::Access)?;
        let refresh = self.mint(user.id, &user.username, &user.role, CredentialType::Refresh)?;
        Ok(TokenPair { access, refresh })
    }

    /// Checks signature and expiry, then the revocation store.
    ///
    /// The store is only consulted for tokens that already passed the
    /// cryptographic checks, so garbage input never costs a round trip.
    ///
    /// # Errors
    /// - `InvalidCredential` / `ExpiredCredential` from the codec
    /// - `RevokedCredential` if a revocation record exists
    /// - `Infrastructure` if the store cannot answer
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.parse(token)?;

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(AuthError::RevokedCredential);
        }
        Ok(claims)
    }

    /// Mints a new access credential from a valid refresh credential.
    ///
    /// The new credential copies the subject, name and role embedded in the
    /// refresh token; the user record is not consulted again. A role change
    /// therefore reaches renewed access credentials only after the next
    /// login, at the latest when the refresh credential expires.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedCredential, AuthError> {
        let claims = self.verify(refresh_token).await?;

        if claims.credential_type != CredentialType::Refresh {
            return Err(AuthError::WrongCredentialType {
                expected: CredentialType::Refresh,
                actual: claims.credential_type,
            });
        }

        self.mint(claims.user_id, &claims.username, &claims.role, CredentialType::Access)
    }

    /// Revokes one credential until its natural expiry.
    ///
    /// Expired but authentic credentials are accepted and produce
    /// [`Revocation::AlreadyExpired`]. A token whose claims cannot be
    /// authenticated and decoded is an error: there is no way to tell what
    /// it refers to.
    #[allow(dead_code)]
    pub async fn revoke(&self, token: &str) -> Result<Revocation, AuthError> {
        let pending = self.pending_revocation(token)?;
        self.record(pending).await
    }

    /// Revokes several credentials of one sign-out.
    ///
    /// Every token is authenticated and decoded before anything is written,
    /// so one bad token rejects the whole batch without revoking the others.
    /// A store failure midway can still leave earlier records in place.
    pub async fn revoke_all(&self, tokens: &[&str]) -> Result<Vec<Revocation>, AuthError> {
        let pending = tokens
            .iter()
            .map(|token| self.pending_revocation(token))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outcomes = Vec::with_capacity(pending.len());
        for revocation in pending {
            outcomes.push(self.record(revocation).await?);
        }
        Ok(outcomes)
    }

    /// Decodes `token` and works out how long its record must live.
    fn pending_revocation(&self, token: &str) -> Result<Revocation, AuthError> {
        let claims = self.codec.parse_for_revocation(token)?;

        let remaining_ms = claims.exp.saturating_mul(1000) - Utc::now().timestamp_millis();
        if remaining_ms <= 0 {
            return Ok(Revocation::AlreadyExpired {
                credential_id: claims.jti,
            });
        }

        Ok(Revocation::Recorded {
            credential_id: claims.jti,
            ttl: Duration::from_millis(remaining_ms as u64),
        })
    }

    async fn record(&self, revocation: Revocation) -> Result<Revocation, AuthError> {
        if let Revocation::Recorded { credential_id, ttl } = &revocation {
            self.revocations.revoke(credential_id, *ttl).await?;
        }
        Ok(revocation)
    }

    fn mint(
        &self,
        user_id: i64,
        username: &str,
        role: &str,
        credential_type: CredentialType,
    ) -> Result<IssuedCredential, AuthError> {
        let ttl = match credential_type {
            CredentialType::Access => self.access_ttl,
            CredentialType::Refresh => self.refresh_ttl,
        };
        let iat = Utc::now().timestamp();

        let claims = Claims {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            jti: Uuid::new_v4().simple().to_string(),
            credential_type,
            iat,
            exp: iat + ttl.as_secs() as i64,
        };
        let token = self.codec.issue(&claims)?;

        Ok(IssuedCredential { token, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::revocation_store::InMemoryRevocationStore;
    use async_trait::async_trait;
    use std::collections::HashSet;

    const SECRET: &[u8] = b"manager-test-secret";

    /// A store whose backend is down.
    struct UnreachableStore;

    #[async_trait]
    impl RevocationStore for UnreachableStore {
        async fn revoke(&self, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn is_revoked(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn test_user() -> User {
        User {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            role: "user".into(),
        }
    }

    fn manager_with(
        store: Arc<dyn RevocationStore>,
        access: Duration,
        refresh: Duration,
    ) -> CredentialManager {
        CredentialManager::new(CredentialCodec::new(SECRET), store, access, refresh)
    }

    fn manager() -> (CredentialManager, Arc<InMemoryRevocationStore>) {
        let store = Arc::new(InMemoryRevocationStore::new());
        let manager = manager_with(
            store.clone(),
            Duration::from_secs(900),
            Duration::from_secs(7 * 24 * 3600),
        );
        (manager, store)
    }

    #[test]
    fn test_issue_produces_distinct_ids() {
        let (manager, _) = manager();
        let user = test_user();

        let first = manager.issue(&user).unwrap();
        let second = manager.issue(&user).unwrap();

        let ids: HashSet<_> = [&first, &second]
            .iter()
            .flat_map(|pair| [pair.access.claims.jti.clone(), pair.refresh.claims.jti.clone()])
            .collect();
        assert_eq!(ids.len(), 4);
        assert_ne!(first.access.token, second.access.token);
    }

    #[test]
    fn test_issue_sets_types_and_lifetimes() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let access = &pair.access.claims;
        assert_eq!(access.credential_type, CredentialType::Access);
        assert_eq!(access.exp - access.iat, 900);
        assert_eq!(access.user_id, 1);
        assert_eq!(access.role, "user");

        let refresh = &pair.refresh.claims;
        assert_eq!(refresh.credential_type, CredentialType::Refresh);
        assert_eq!(refresh.exp - refresh.iat, 7 * 24 * 3600);
    }

    #[tokio::test]
    async fn test_verify_fresh_access() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let claims = manager.verify(&pair.access.token).await.unwrap();
        assert_eq!(claims.credential_type, CredentialType::Access);
        assert_eq!(claims, pair.access.claims);
    }

    #[tokio::test]
    async fn test_revoke_then_verify_fails() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let outcome = manager.revoke(&pair.access.token).await.unwrap();
        assert!(matches!(outcome, Revocation::Recorded { .. }));
        assert!(matches!(
            manager.verify(&pair.access.token).await,
            Err(AuthError::RevokedCredential)
        ));
    }

    #[tokio::test]
    async fn test_revoking_one_device_leaves_others() {
        let (manager, _) = manager();
        let user = test_user();
        let phone = manager.issue(&user).unwrap();
        let laptop = manager.issue(&user).unwrap();

        manager.revoke(&phone.access.token).await.unwrap();

        assert!(manager.verify(&laptop.access.token).await.is_ok());
        assert!(manager.verify(&phone.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_ttl_within_remaining_lifetime() {
        let (manager, store) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let outcome = manager.revoke(&pair.access.token).await.unwrap();
        let Revocation::Recorded { credential_id, ttl } = outcome else {
            panic!("expected a recorded revocation");
        };
        assert_eq!(credential_id, pair.access.claims.jti);
        assert!(ttl <= Duration::from_secs(900));

        let left = store.remaining_ttl(&credential_id).unwrap();
        assert!(left <= ttl);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_credential() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        assert!(matches!(
            manager.refresh(&pair.access.token).await,
            Err(AuthError::WrongCredentialType {
                expected: CredentialType::Refresh,
                actual: CredentialType::Access,
            })
        ));
    }

    #[tokio::test]
    async fn test_refresh_mints_new_access() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let renewed = manager.refresh(&pair.refresh.token).await.unwrap();
        assert_eq!(renewed.claims.credential_type, CredentialType::Access);
        assert_ne!(renewed.claims.jti, pair.refresh.claims.jti);
        assert_ne!(renewed.claims.jti, pair.access.claims.jti);
        assert_eq!(renewed.claims.user_id, pair.refresh.claims.user_id);
        assert_eq!(renewed.claims.role, pair.refresh.claims.role);

        let verified = manager.verify(&renewed.token).await.unwrap();
        assert_eq!(verified.jti, renewed.claims.jti);
    }

    #[tokio::test]
    async fn test_refresh_with_revoked_refresh_fails() {
        let (manager, _) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        manager.revoke(&pair.refresh.token).await.unwrap();
        assert!(matches!(
            manager.refresh(&pair.refresh.token).await,
            Err(AuthError::RevokedCredential)
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_role_snapshot() {
        let (manager, _) = manager();
        let mut user = test_user();
        let pair = manager.issue(&user).unwrap();

        user.role = "admin".into();
        let renewed = manager.refresh(&pair.refresh.token).await.unwrap();
        assert_eq!(renewed.claims.role, "user");
    }

    #[tokio::test]
    async fn test_expired_access_still_refreshable() {
        let store = Arc::new(InMemoryRevocationStore::new());
        let manager = manager_with(store, Duration::from_secs(1), Duration::from_secs(60));
        let pair = manager.issue(&test_user()).unwrap();

        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert!(matches!(
            manager.verify(&pair.access.token).await,
            Err(AuthError::ExpiredCredential)
        ));
        let renewed = manager.refresh(&pair.refresh.token).await.unwrap();
        assert!(manager.verify(&renewed.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoking_expired_credential_is_noop() {
        let store = Arc::new(InMemoryRevocationStore::new());
        let manager = manager_with(store.clone(), Duration::from_secs(1), Duration::from_secs(60));
        let pair = manager.issue(&test_user()).unwrap();

        tokio::time::sleep(Duration::from_millis(2100)).await;

        let outcome = manager.revoke(&pair.access.token).await.unwrap();
        assert_eq!(
            outcome,
            Revocation::AlreadyExpired {
                credential_id: pair.access.claims.jti.clone()
            }
        );
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_revocation_record_lapses_with_credential() {
        let store = Arc::new(InMemoryRevocationStore::new());
        let manager = manager_with(store.clone(), Duration::from_secs(2), Duration::from_secs(60));
        let pair = manager.issue(&test_user()).unwrap();

        manager.revoke(&pair.access.token).await.unwrap();
        assert!(store.is_revoked(&pair.access.claims.jti).await.unwrap());

        tokio::time::sleep(Duration::from_millis(3100)).await;

        assert!(!store.is_revoked(&pair.access.claims.jti).await.unwrap());
        assert!(matches!(
            manager.verify(&pair.access.token).await,
            Err(AuthError::ExpiredCredential)
        ));
    }

    #[tokio::test]
    async fn test_revoke_undecodable_is_error() {
        let (manager, store) = manager();

        assert!(matches!(
            manager.revoke("not-a-token").await,
            Err(AuthError::InvalidCredential(_))
        ));

        let foreign = CredentialManager::new(
            CredentialCodec::new(b"someone-else"),
            Arc::new(InMemoryRevocationStore::new()),
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .issue(&test_user())
        .unwrap();
        assert!(matches!(
            manager.revoke(&foreign.access.token).await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_infrastructure_error() {
        let manager = manager_with(
            Arc::new(UnreachableStore),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let pair = manager.issue(&test_user()).unwrap();

        assert!(matches!(
            manager.verify(&pair.access.token).await,
            Err(AuthError::Infrastructure(_))
        ));
        assert!(matches!(
            manager.revoke(&pair.access.token).await,
            Err(AuthError::Infrastructure(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_token_never_reaches_store() {
        let manager = manager_with(
            Arc::new(UnreachableStore),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        assert!(matches!(
            manager.verify("garbage").await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_writes_nothing_when_one_token_is_bad() {
        let (manager, store) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        assert!(matches!(
            manager.revoke_all(&[pair.access.token.as_str(), "garbage"]).await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert_eq!(store.len(), 0);
        assert!(manager.verify(&pair.access.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_all_revokes_both_tokens_of_a_device() {
        let (manager, store) = manager();
        let pair = manager.issue(&test_user()).unwrap();

        let outcomes = manager
            .revoke_all(&[pair.access.token.as_str(), pair.refresh.token.as_str()])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(store.len(), 2);
        assert!(matches!(
            manager.refresh(&pair.refresh.token).await,
            Err(AuthError::RevokedCredential)
        ));
    }
}
