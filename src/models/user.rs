// src/models/user.rs
//! User entity as seen by the credential engine.
//!
//! The engine only reads `id`, `username` and `role` to mint claims and hands
//! `password_hash` to the password hasher. Persistence lives behind
//! [`crate::storage::user_repository::UserRepository`].

use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Repository-assigned identifier; `0` means "not yet assigned"
    pub id: i64,

    pub username: String,

    pub email: String,

    /// Encoded Argon2 record, never serialized into responses
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: String,
}

impl User {
    /// Builds an unsaved user; the repository assigns the id on create.
    #[allow(dead_code)]
    pub fn new(username: &str, email: &str, password_hash: String, role: &str) -> Self {
        User {
            id: 0,
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: role.to_string(),
        }
    }
}
