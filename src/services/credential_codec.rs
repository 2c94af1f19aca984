// src/services/credential_codec.rs
//! Signed credential encoding.
//!
//! Credentials are compact JWS tokens (`header.claims.signature`, each segment
//! base64url) signed with HMAC-SHA256 under a shared secret. The codec is pure:
//! no I/O, no logging, no revocation knowledge.
//!
//! # Security Considerations
//! - Only HS256 is accepted when verifying. Tokens declaring any other
//!   algorithm, including `none`, are rejected before the signature is checked.
//! - Expiry is enforced with zero leeway.

use crate::error::CodecError;
use crate::models::claims::Claims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Encodes and decodes signed credentials under one shared secret.
#[derive(Clone)]
pub struct CredentialCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl CredentialCodec {
    /// Creates a codec from the raw HMAC secret.
    pub fn new(secret: &[u8]) -> Self {
        CredentialCodec {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Signs `claims` and returns the compact token string.
    ///
    /// HMAC is deterministic, so identical claims produce identical tokens.
    /// Callers must vary `jti` per issuance.
    pub fn issue(&self, claims: &Claims) -> Result<String, CodecError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| CodecError::Signing(e.to_string()))
    }

    /// Verifies signature, algorithm and expiry, then returns the claims.
    ///
    /// # Errors
    /// - `CodecError::Expired` when only the expiry check failed
    /// - `CodecError::Invalid` for everything else
    pub fn parse(&self, token: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    /// Decodes claims for revocation without enforcing expiry.
    ///
    /// The signature must still verify under the shared secret, but any
    /// HMAC variant is tolerated. An unsigned or foreign token can never
    /// reach the revocation store.
    pub fn parse_for_revocation(&self, token: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> CodecError {
    match err.kind() {
        ErrorKind::ExpiredSignature => CodecError::Expired,
        _ => CodecError::Invalid(err.to_string()),
    }
}
