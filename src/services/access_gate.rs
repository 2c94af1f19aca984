// src/services/access_gate.rs
//! Request-time admission decisions.
//!
//! The gate turns an inbound credential string into exactly one of three
//! outcomes: admitted with typed claims, denied with a reason, or an
//! infrastructure error when revocation status cannot be determined. It knows
//! nothing about HTTP; the router binds it once as middleware.

use crate::error::{AuthError, StoreError};
use crate::models::claims::{Claims, CredentialType};
use crate::services::credential_manager::CredentialManager;
use std::fmt;
use std::sync::Arc;

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    MissingCredential,
    MalformedAuthorization,
    InvalidCredential,
    ExpiredCredential,
    RevokedCredential,
    /// A refresh credential was presented where an access credential is required.
    WrongCredentialType,
    /// Authenticated, but the role snapshot does not match.
    InsufficientRole { required: String },
}

impl DenialReason {
    /// Whether this denial is an authorization (403) rather than authentication (401) failure.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DenialReason::InsufficientRole { .. })
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::MissingCredential => f.write_str("missing authorization header"),
            DenialReason::MalformedAuthorization => {
                f.write_str("invalid authorization header format")
            }
            DenialReason::InvalidCredential => f.write_str("invalid token"),
            DenialReason::ExpiredCredential => f.write_str("token expired"),
            DenialReason::RevokedCredential => f.write_str("token has been revoked"),
            DenialReason::WrongCredentialType => f.write_str("invalid token type"),
            DenialReason::InsufficientRole { .. } => f.write_str("insufficient permissions"),
        }
    }
}

/// Outcome of a successful gate evaluation.
#[derive(Debug, Clone)]
pub enum GateDecision {
    Admitted(Claims),
    Denied(DenialReason),
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, DenialReason> {
    let header = header.ok_or(DenialReason::MissingCredential)?;
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(DenialReason::MalformedAuthorization),
    }
}

/// Admits requests carrying a valid, unrevoked access credential.
#[derive(Clone)]
pub struct AccessGate {
    manager: Arc<CredentialManager>,
}

impl AccessGate {
    pub fn new(manager: Arc<CredentialManager>) -> Self {
        AccessGate { manager }
    }

    /// Evaluates `token`, optionally requiring an exact role.
    ///
    /// The role check runs only after the credential authenticated.
    ///
    /// # Errors
    /// Only when the revocation store cannot answer.
    pub async fn admit(
        &self,
        token: &str,
        required_role: Option<&str>,
    ) -> Result<GateDecision, StoreError> {
        let claims = match self.manager.verify(token).await {
            Ok(claims) => claims,
            Err(err) => return deny_for(err),
        };

        if claims.credential_type != CredentialType::Access {
            return Ok(GateDecision::Denied(DenialReason::WrongCredentialType));
        }

        if let Some(required) = required_role {
            if claims.role != required {
                return Ok(GateDecision::Denied(DenialReason::InsufficientRole {
                    required: required.to_string(),
                }));
            }
        }

        Ok(GateDecision::Admitted(claims))
    }

    /// Same as [`AccessGate::admit`], starting from the raw header value.
    pub async fn admit_header(
        &self,
        header: Option<&str>,
        required_role: Option<&str>,
    ) -> Result<GateDecision, StoreError> {
        match bearer_token(header) {
            Ok(token) => self.admit(token, required_role).await,
            Err(reason) => Ok(GateDecision::Denied(reason)),
        }
    }
}

fn deny_for(err: AuthError) -> Result<GateDecision, StoreError> {
    let reason = match err {
        AuthError::Infrastructure(store_err) => return Err(store_err),
        AuthError::ExpiredCredential => DenialReason::ExpiredCredential,
        AuthError::RevokedCredential => DenialReason::RevokedCredential,
        AuthError::WrongCredentialType { .. } => DenialReason::WrongCredentialType,
        AuthError::InvalidCredential(_)
        | AuthError::MalformedPasswordRecord(_)
        | AuthError::Signing(_) => DenialReason::InvalidCredential,
    };
    Ok(GateDecision::Denied(reason))
}
