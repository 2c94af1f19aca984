// src/storage/user_repository.rs
//! User lookup and management contract.
//!
//! The credential engine only needs `get_by_username`; the remaining
//! operations exist so operators can manage accounts against either backend.

use crate::error::RepositoryError;
use crate::models::user::User;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Storage-agnostic user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Looks a user up by login name. `Ok(None)` means not found.
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Persists a new user and returns it with its assigned id.
    #[allow(dead_code)]
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    /// Replaces the stored user with the same id.
    #[allow(dead_code)]
    async fn update(&self, user: &User) -> Result<(), RepositoryError>;

    #[allow(dead_code)]
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

/// Users kept in a lock-guarded map keyed by username.
///
/// Reads hand out clones, so callers can never mutate stored state.
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        InMemoryUserRepository {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Repository holding the two demonstration accounts.
    ///
    /// - `admin` / `admin123`, role `admin`
    /// - `user` / `user123`, role `user`
    pub fn with_default_users() -> Self {
        let users = [
            User {
                id: 1,
                username: "admin".into(),
                email: "admin@example.com".into(),
                password_hash: "$argon2id$v=19$m=65536,t=3,p=2$mwTVNvIy4EBaphLMv6Iozg$HrAc8MQ/g1HX6eryWcFc75h7vknOqADznwS6zA04REw".into(),
                role: "admin".into(),
            },
            User {
                id: 2,
                username: "user".into(),
                email: "user@example.com".into(),
                password_hash: "$argon2id$v=19$m=65536,t=3,p=2$P00D1MRXhY+tSrYMCDe0rg$JkUThHcvsIxD1RW+5zGqCfvzbtK2+RQ5iV6jyH/OcjI".into(),
                role: "user".into(),
            },
        ];

        InMemoryUserRepository {
            users: RwLock::new(
                users
                    .into_iter()
                    .map(|user| (user.username.clone(), user))
                    .collect(),
            ),
        }
    }

    fn username_for_id(users: &HashMap<String, User>, id: i64) -> Option<String> {
        users
            .values()
            .find(|user| user.id == id)
            .map(|user| user.username.clone())
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().get(username).cloned())
    }

    async fn create(&self, mut user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write();
        if users.contains_key(&user.username) {
            return Err(RepositoryError::DuplicateUsername(user.username));
        }

        if user.id <= 0 {
            user.id = users.values().map(|u| u.id).max().unwrap_or(0) + 1;
        }
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write();
        let current = Self::username_for_id(&users, user.id)
            .ok_or(RepositoryError::NotFound(user.id))?;

        if current != user.username {
            if users.contains_key(&user.username) {
                return Err(RepositoryError::DuplicateUsername(user.username.clone()));
            }
            users.remove(&current);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let mut users = self.users.write();
        let username = Self::username_for_id(&users, id).ok_or(RepositoryError::NotFound(id))?;
        users.remove(&username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User::new(name, &format!("{}@example.com", name), "$hash".into(), "user")
    }

    #[tokio::test]
    async fn test_defaults_present() {
        let repo = InMemoryUserRepository::with_default_users();
        let admin = repo.get_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.id, 1);
        assert_eq!(admin.role, "admin");
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_assigns_next_id() {
        let repo = InMemoryUserRepository::with_default_users();
        let created = repo.create(user("carol")).await.unwrap();
        assert_eq!(created.id, 3);

        let fetched = repo.get_by_username("carol").await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let repo = InMemoryUserRepository::new();
        repo.create(user("dave")).await.unwrap();
        assert!(matches!(
            repo.create(user("dave")).await,
            Err(RepositoryError::DuplicateUsername(name)) if name == "dave"
        ));
    }

    #[tokio::test]
    async fn test_update_renames() {
        let repo = InMemoryUserRepository::new();
        let mut erin = repo.create(user("erin")).await.unwrap();

        erin.username = "erin2".into();
        erin.role = "admin".into();
        repo.update(&erin).await.unwrap();

        assert!(repo.get_by_username("erin").await.unwrap().is_none());
        let renamed = repo.get_by_username("erin2").await.unwrap().unwrap();
        assert_eq!(renamed.role, "admin");
    }

    #[tokio::test]
    async fn test_update_rejects_collision_and_unknown() {
        let repo = InMemoryUserRepository::new();
        repo.create(user("frank")).await.unwrap();
        let mut grace = repo.create(user("grace")).await.unwrap();

        grace.username = "frank".into();
        assert!(matches!(
            repo.update(&grace).await,
            Err(RepositoryError::DuplicateUsername(_))
        ));

        let ghost = User { id: 99, ..user("ghost") };
        assert!(matches!(
            repo.update(&ghost).await,
            Err(RepositoryError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryUserRepository::with_default_users();
        repo.delete(2).await.unwrap();
        assert!(repo.get_by_username("user").await.unwrap().is_none());
        assert!(matches!(repo.delete(2).await, Err(RepositoryError::NotFound(2))));
    }
}
