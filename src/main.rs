// src/main.rs

//! # Session Guard - Main Entry Point
//!
//! Wires the credential engine to its collaborators and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Services Layer**: credential codec, credential manager, access gate and HTTP API
//! 2. **Storage Layer**: revocation store (Redis) and user repository (PostgreSQL)
//! 3. **Utilities**: Argon2id password hashing
//!
//! ## Environment Variables
//! - `JWT_SECRET`: HMAC signing key
//! - `ACCESS_TOKEN_EXPIRATION` / `REFRESH_TOKEN_EXPIRATION`: credential lifetimes (`15m`, `7d`)
//! - `REDIS_ADDR`, `REDIS_PASSWORD`, `REDIS_DB`: revocation store
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`: (Optional) user database
//! - `LISTEN_ADDR`: (Optional) bind address (default: 0.0.0.0:8080)

use crate::config::Config;
use crate::services::api_server::ApiServer;
use crate::services::credential_codec::CredentialCodec;
use crate::services::credential_manager::CredentialManager;
use crate::storage::postgres_users::PostgresUserRepository;
use crate::storage::redis_store::RedisRevocationStore;
use crate::storage::revocation_store::{InMemoryRevocationStore, RevocationStore};
use crate::storage::user_repository::{InMemoryUserRepository, UserRepository};
use crate::utils::password::PasswordHasher;
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod config;        // Environment configuration
mod error;         // Error types
mod models;        // Claims and users
mod services;      // Credential engine and API
mod storage;       // Revocation and user stores
mod utils;         // Password hashing

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Select user repository and revocation store
/// 3. Build the credential engine
/// 4. Serve until Ctrl-C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().context("invalid configuration")?;
    info!("Loaded configuration: {:?}", config);

    let users = user_repository(&config).await;
    let revocations = revocation_store(&config).await;

    let credential_manager = Arc::new(CredentialManager::new(
        CredentialCodec::new(config.jwt_secret.as_bytes()),
        revocations,
        config.access_token_ttl,
        config.refresh_token_ttl,
    ));
    let password_hasher = PasswordHasher::new(config.password_params)
        .context("invalid password hashing parameters")?;

    let api_server = ApiServer::new(
        credential_manager,
        users,
        password_hasher,
        config.login_concurrency,
    );

    api_server
        .run(config.listen_addr, shutdown_signal())
        .await
        .context("API server failed")?;

    info!("API server stopped");
    Ok(())
}

/// PostgreSQL when configured and reachable, otherwise the seeded in-memory store.
async fn user_repository(config: &Config) -> Arc<dyn UserRepository> {
    let Some(settings) = &config.database else {
        info!("DB_HOST not set, using in-memory user repository");
        return Arc::new(InMemoryUserRepository::with_default_users());
    };

    match PostgresUserRepository::connect(settings).await {
        Ok(repository) => Arc::new(repository),
        Err(e) => {
            warn!(
                "Failed to connect to PostgreSQL ({}), using in-memory user repository",
                e
            );
            Arc::new(InMemoryUserRepository::with_default_users())
        }
    }
}

/// Redis when reachable, otherwise a process-local store.
async fn revocation_store(config: &Config) -> Arc<dyn RevocationStore> {
    let connected = match RedisRevocationStore::connect(
        &config.redis_url,
        &config.revocation_key_prefix,
    )
    .await
    {
        Ok(store) => store.ping().await.map(|_| store),
        Err(e) => Err(e),
    };

    match connected {
        Ok(store) => {
            info!("Using Redis revocation store");
            Arc::new(store)
        }
        Err(e) => {
            error!(
                "Redis unavailable ({}); revocations will be process-local and lost on restart",
                e
            );
            Arc::new(InMemoryRevocationStore::with_prefix(
                &config.revocation_key_prefix,
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
