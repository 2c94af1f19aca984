// src/storage/postgres_users.rs
//! PostgreSQL user repository.
//!
//! Expects the `users` table from `migrations/0001_create_users.sql`.
//! Running migrations is the operator's job.

use crate::error::RepositoryError;
use crate::models::user::User;
use crate::storage::user_repository::UserRepository;
use async_trait::async_trait;
use log::info;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::Row;
use std::time::Duration;

/// Upper bound for any single query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the user database.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub max_lifetime: Duration,
}

impl DatabaseSettings {
    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(PgSslMode::Require)
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("max_lifetime", &self.max_lifetime)
            .finish()
    }
}

/// `UserRepository` over a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Opens the pool and verifies connectivity.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .max_lifetime(settings.max_lifetime)
            .acquire_timeout(QUERY_TIMEOUT)
            .connect_with(settings.connect_options())
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Connected to PostgreSQL at {}:{}", settings.host, settings.port);

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PostgresUserRepository { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        role: row.try_get("role")?,
    })
}

async fn with_timeout<T, F>(query: F) -> Result<T, RepositoryError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(QUERY_TIMEOUT, query)
        .await
        .map_err(|_| RepositoryError::Database(sqlx::Error::PoolTimedOut))?
        .map_err(RepositoryError::from)
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = with_timeout(
            sqlx::query(
                "SELECT id, username, email, password, role FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn create(&self, mut user: User) -> Result<User, RepositoryError> {
        let result = with_timeout(
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO users (username, email, password, role) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .fetch_one(&self.pool),
        )
        .await;

        match result {
            Ok(id) => {
                user.id = id;
                Ok(user)
            }
            Err(RepositoryError::Database(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                Err(RepositoryError::DuplicateUsername(user.username))
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let result = with_timeout(
            sqlx::query(
                "UPDATE users \
                 SET username = $1, email = $2, password = $3, role = $4, updated_at = CURRENT_TIMESTAMP \
                 WHERE id = $5",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .bind(user.id)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(user.id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let result = with_timeout(
            sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }
}
