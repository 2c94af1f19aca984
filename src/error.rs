// src/error.rs
//! Error taxonomy for the session credential engine.
//!
//! Each layer has its own error enum so callers can tell a mangled token from
//! an unreachable cache from a corrupt password record. The engine never
//! recovers from any of these; it hands them back to the caller untouched.

use crate::models::claims::CredentialType;
use thiserror::Error;

/// Failures of the signed credential format.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Signature valid, but `exp` is in the past.
    #[error("credential expired")]
    Expired,

    /// Bad signature, unexpected algorithm, or undecodable claims.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The encoder refused the claims. Should not happen with HMAC keys.
    #[error("failed to sign credential: {0}")]
    Signing(String),
}

/// Failures while decoding or evaluating a password hash record.
#[derive(Error, Debug)]
pub enum PasswordError {
    /// The stored record does not have the expected shape or parameters.
    #[error("malformed password record: {0}")]
    Malformed(String),

    /// Key derivation failed while hashing a new password.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Failures of the revocation store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing cache could not be reached or rejected the command.
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Failures of the user repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[allow(dead_code)]
    #[error("username already exists: {0}")]
    DuplicateUsername(String),

    #[allow(dead_code)]
    #[error("user not found: {0}")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Engine-level outcome of a credential operation that did not succeed.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential expired")]
    ExpiredCredential,

    #[error("credential has been revoked")]
    RevokedCredential,

    #[error("expected {expected} credential, got {actual}")]
    WrongCredentialType {
        expected: CredentialType,
        actual: CredentialType,
    },

    #[error(transparent)]
    Infrastructure(#[from] StoreError),

    #[error(transparent)]
    MalformedPasswordRecord(PasswordError),

    #[error("failed to sign credential: {0}")]
    Signing(String),
}

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Expired => AuthError::ExpiredCredential,
            CodecError::Invalid(reason) => AuthError::InvalidCredential(reason),
            CodecError::Signing(reason) => AuthError::Signing(reason),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::MalformedPasswordRecord(err)
    }
}
