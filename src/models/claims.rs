// src/models/claims.rs
//! Session credential claims.
//!
//! Access and refresh credentials share one claim shape and differ only in
//! the `type` tag and their lifetime. The serialized field names are part of
//! the wire format and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Distinguishes short-lived request credentials from long-lived renewal ones.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Access,
    Refresh,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Access => "access",
            CredentialType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims embedded in, and signed as part of, every issued credential.
///
/// `username` and `role` are snapshots taken at issuance. They are not
/// refreshed when the user record changes, so a role change only takes
/// effect once the user logs in again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Owner of the credential
    pub user_id: i64,

    /// Display name of the owner; never trusted for authorization
    pub username: String,

    /// Role of the owner at issuance time
    pub role: String,

    /// Unique per issuance; the revocation key
    pub jti: String,

    /// `access` or `refresh`
    #[serde(rename = "type")]
    pub credential_type: CredentialType,

    /// Issued-at, seconds since the Unix epoch
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

/// A freshly signed credential together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    #[allow(dead_code)]
    pub claims: Claims,
}

/// The pair handed out on login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedCredential,
    pub refresh: IssuedCredential,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let claims = Claims {
            user_id: 7,
            username: "alice".into(),
            role: "user".into(),
            jti: "abc".into(),
            credential_type: CredentialType::Refresh,
            iat: 100,
            exp: 200,
        };

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value,
            json!({
                "user_id": 7,
                "username": "alice",
                "role": "user",
                "jti": "abc",
                "type": "refresh",
                "iat": 100,
                "exp": 200
            })
        );
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let raw = json!({
            "user_id": 1, "username": "a", "role": "user", "jti": "x",
            "type": "session", "iat": 0, "exp": 1
        });
        assert!(serde_json::from_value::<Claims>(raw).is_err());
    }
}
