// src/config.rs
//! Runtime configuration.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by `dotenv` in `main`), layered over built-in defaults with the
//! `config` crate. Environment variable names are the upper-case forms of the
//! keys below, e.g. `ACCESS_TOKEN_EXPIRATION` for `access_token_expiration`.
//!
//! Durations are written as an integer with an optional unit suffix:
//! `ms`, `s`, `m`, `h` or `d` (`15m`, `7d`, `3600`).

use crate::storage::postgres_users::DatabaseSettings;
use crate::storage::revocation_store::DEFAULT_KEY_PREFIX;
use crate::utils::password::PasswordParams;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Raw settings exactly as read from the environment.
#[derive(Deserialize)]
struct RawConfig {
    jwt_secret: String,
    access_token_expiration: String,
    refresh_token_expiration: String,
    redis_addr: String,
    redis_password: String,
    redis_db: u32,
    revocation_key_prefix: String,
    db_host: String,
    db_port: u16,
    db_user: String,
    db_password: String,
    db_name: String,
    db_max_open_conns: u32,
    db_conn_max_lifetime: u64,
    listen_addr: String,
    login_concurrency: usize,
    password_memory_cost: u32,
    password_iterations: u32,
    password_parallelism: u32,
}

/// Validated application configuration.
#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub redis_url: String,
    pub revocation_key_prefix: String,
    /// `None` means the in-memory user repository is used
    pub database: Option<DatabaseSettings>,
    pub listen_addr: SocketAddr,
    /// Upper bound on password verifications running at once
    pub login_concurrency: usize,
    pub password_params: PasswordParams,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_builder(config::Config::builder().add_source(Environment::default()))
    }

    /// Applies defaults underneath `builder`'s sources and validates the result.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let raw: RawConfig = builder
            .set_default("jwt_secret", "your-super-secret-key-change-in-production")?
            .set_default("access_token_expiration", "15m")?
            .set_default("refresh_token_expiration", "7d")?
            .set_default("redis_addr", "localhost:6379")?
            .set_default("redis_password", "")?
            .set_default("redis_db", 0)?
            .set_default("revocation_key_prefix", DEFAULT_KEY_PREFIX)?
            .set_default("db_host", "")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "")?
            .set_default("db_password", "")?
            .set_default("db_name", "")?
            .set_default("db_max_open_conns", 10)?
            .set_default("db_conn_max_lifetime", 30)?
            .set_default("listen_addr", "0.0.0.0:8080")?
            .set_default("login_concurrency", 4)?
            .set_default("password_memory_cost", 64 * 1024)?
            .set_default("password_iterations", 3)?
            .set_default("password_parallelism", 2)?
            .build()?
            .try_deserialize()?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.jwt_secret.is_empty() {
            return Err(ConfigError::Message("JWT_SECRET must not be empty".into()));
        }

        let access_token_ttl = parse_ttl("ACCESS_TOKEN_EXPIRATION", &raw.access_token_expiration)?;
        let refresh_token_ttl =
            parse_ttl("REFRESH_TOKEN_EXPIRATION", &raw.refresh_token_expiration)?;

        let listen_addr = raw.listen_addr.parse().map_err(|e| {
            ConfigError::Message(format!("LISTEN_ADDR '{}' is invalid: {}", raw.listen_addr, e))
        })?;

        if raw.login_concurrency == 0 {
            return Err(ConfigError::Message("LOGIN_CONCURRENCY must be at least 1".into()));
        }

        let redis_url = if raw.redis_password.is_empty() {
            format!("redis://{}/{}", raw.redis_addr, raw.redis_db)
        } else {
            format!("redis://:{}@{}/{}", raw.redis_password, raw.redis_addr, raw.redis_db)
        };

        let database = if raw.db_host.is_empty() {
            None
        } else {
            Some(DatabaseSettings {
                host: raw.db_host,
                port: raw.db_port,
                user: raw.db_user,
                password: raw.db_password,
                name: raw.db_name,
                max_connections: raw.db_max_open_conns,
                max_lifetime: Duration::from_secs(raw.db_conn_max_lifetime * 60),
            })
        };

        Ok(Config {
            jwt_secret: raw.jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            redis_url,
            revocation_key_prefix: raw.revocation_key_prefix,
            database,
            listen_addr,
            login_concurrency: raw.login_concurrency,
            password_params: PasswordParams {
                memory: raw.password_memory_cost,
                iterations: raw.password_iterations,
                parallelism: raw.password_parallelism,
                ..PasswordParams::default()
            },
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("redis_url", &redact_url(&self.redis_url))
            .field("revocation_key_prefix", &self.revocation_key_prefix)
            .field("database", &self.database)
            .field("listen_addr", &self.listen_addr)
            .field("login_concurrency", &self.login_concurrency)
            .field("password_params", &self.password_params)
            .finish()
    }
}

fn redact_url(url: &str) -> String {
    match (url.find("://:"), url.find('@')) {
        (Some(start), Some(end)) if start + 4 <= end => {
            format!("{}[REDACTED]{}", &url[..start + 4], &url[end..])
        }
        _ => url.to_string(),
    }
}

/// Parses a credential lifetime: whole seconds, at least one.
///
/// Credential expiry is second-granular, so `1500ms` is rejected rather than
/// silently truncated.
fn parse_ttl(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let ttl = parse_duration(value)
        .ok_or_else(|| ConfigError::Message(format!("{} '{}' is not a duration", name, value)))?;
    if ttl < Duration::from_secs(1) {
        return Err(ConfigError::Message(format!(
            "{} must be at least one second",
            name
        )));
    }
    if ttl.subsec_nanos() != 0 {
        return Err(ConfigError::Message(format!(
            "{} '{}' must be a whole number of seconds",
            name, value
        )));
    }
    Ok(ttl)
}

/// Parses `<integer><unit>` where unit is one of `ms`, `s`, `m`, `h`, `d`.
/// A bare integer is seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let seconds_per_unit = match unit {
        "ms" => return Some(Duration::from_millis(amount)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    amount.checked_mul(seconds_per_unit).map(Duration::from_secs)
}
