// src/utils/password.rs
//! Memory-hard password hashing.
//!
//! Records are self-describing strings in the PHC-like layout
//!
//! ```text
//! $argon2id$v=19$m=<memory KiB>,t=<iterations>,p=<parallelism>$<salt>$<key>
//! ```
//!
//! where salt and key are standard base64 without padding. Verification takes
//! every parameter from the record, so records written with older cost
//! settings keep verifying after the defaults change.

use crate::error::PasswordError;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Cost parameters for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    /// Memory cost in KiB
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Salt length in bytes (at least 16)
    pub salt_length: usize,
    /// Derived key length in bytes
    pub key_length: usize,
}

impl Default for PasswordParams {
    fn default() -> Self {
        PasswordParams {
            memory: 64 * 1024,
            iterations: 3,
            parallelism: 2,
            salt_length: 16,
            key_length: 32,
        }
    }
}

const MIN_SALT_LENGTH: usize = 16;

/// Ceilings on the cost fields of a stored record (1 GiB of memory). A record
/// asking for more is treated as corrupt instead of being run.
const MAX_MEMORY_KIB: u32 = 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 64;

/// Hashes and verifies passwords with Argon2.
///
/// Both operations are CPU and memory bound on purpose. From async code run
/// them through `tokio::task::spawn_blocking` and bound how many run at once.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: PasswordParams,
}

impl PasswordHasher {
    pub fn new(params: PasswordParams) -> Result<Self, PasswordError> {
        if params.salt_length < MIN_SALT_LENGTH {
            return Err(PasswordError::Hashing(format!(
                "salt length {} is below the minimum of {}",
                params.salt_length, MIN_SALT_LENGTH
            )));
        }
        Params::new(
            params.memory,
            params.iterations,
            params.parallelism,
            Some(params.key_length),
        )
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(PasswordHasher { params })
    }

    /// Hashes `password` under a fresh random salt and returns the encoded record.
    #[allow(dead_code)]
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let p = &self.params;

        let mut salt = vec![0u8; p.salt_length];
        OsRng.fill_bytes(&mut salt);

        let params = Params::new(p.memory, p.iterations, p.parallelism, Some(p.key_length))
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        let mut key = vec![0u8; p.key_length];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), &salt, &mut key)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(format!(
            "$argon2id$v={}$m={},t={},p={}${}${}",
            Version::V0x13 as u32,
            p.memory,
            p.iterations,
            p.parallelism,
            base64::encode_config(&salt, base64::STANDARD_NO_PAD),
            base64::encode_config(&key, base64::STANDARD_NO_PAD),
        ))
    }

    /// Checks `password` against an encoded record.
    ///
    /// # Returns
    /// - `Ok(true)` / `Ok(false)` for match / mismatch
    /// - `Err(PasswordError::Malformed)` if the record cannot be decoded
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let record = DecodedRecord::parse(encoded)?;

        let params = Params::new(
            record.memory,
            record.iterations,
            record.parallelism,
            Some(record.key.len()),
        )
        .map_err(|e| PasswordError::Malformed(e.to_string()))?;

        let mut derived = vec![0u8; record.key.len()];
        Argon2::new(record.algorithm, record.version, params)
            .hash_password_into(password.as_bytes(), &record.salt, &mut derived)
            .map_err(|e| PasswordError::Malformed(e.to_string()))?;

        Ok(derived.as_slice().ct_eq(record.key.as_slice()).into())
    }
}

/// A parsed password record.
struct DecodedRecord {
    algorithm: Algorithm,
    version: Version,
    memory: u32,
    iterations: u32,
    parallelism: u32,
    salt: Vec<u8>,
    key: Vec<u8>,
}

impl DecodedRecord {
    fn parse(encoded: &str) -> Result<Self, PasswordError> {
        let fields: Vec<&str> = encoded.split('$').collect();
        if fields.len() != 6 || !fields[0].is_empty() {
            return Err(PasswordError::Malformed(format!(
                "expected 6 '$'-delimited fields, found {}",
                fields.len()
            )));
        }

        let algorithm = match fields[1] {
            "argon2id" => Algorithm::Argon2id,
            "argon2i" => Algorithm::Argon2i,
            "argon2d" => Algorithm::Argon2d,
            other => {
                return Err(PasswordError::Malformed(format!(
                    "unsupported algorithm '{}'",
                    other
                )))
            }
        };

        let version = fields[2]
            .strip_prefix("v=")
            .and_then(|v| v.parse::<u32>().ok())
            .and_then(|v| Version::try_from(v).ok())
            .ok_or_else(|| PasswordError::Malformed(format!("bad version field '{}'", fields[2])))?;

        let (memory, iterations, parallelism) = parse_cost(fields[3])?;

        let salt = base64::decode_config(fields[4], base64::STANDARD_NO_PAD)
            .map_err(|_| PasswordError::Malformed("invalid salt encoding".into()))?;
        let key = base64::decode_config(fields[5], base64::STANDARD_NO_PAD)
            .map_err(|_| PasswordError::Malformed("invalid hash encoding".into()))?;
        if key.is_empty() {
            return Err(PasswordError::Malformed("empty hash".into()));
        }

        Ok(DecodedRecord {
            algorithm,
            version,
            memory,
            iterations,
            parallelism,
            salt,
            key,
        })
    }
}

/// Parses `m=<u32>,t=<u32>,p=<u32>` in exactly that order, each within its ceiling.
fn parse_cost(field: &str) -> Result<(u32, u32, u32), PasswordError> {
    let malformed = || PasswordError::Malformed(format!("bad cost field '{}'", field));

    let mut values = [0u32; 3];
    let mut parts = field.split(',');
    let limits = [("m=", MAX_MEMORY_KIB), ("t=", MAX_ITERATIONS), ("p=", MAX_PARALLELISM)];
    for (slot, (name, max)) in values.iter_mut().zip(limits) {
        *slot = parts
            .next()
            .and_then(|part| part.strip_prefix(name))
            .and_then(|v| v.parse().ok())
            .filter(|v| *v <= max)
            .ok_or_else(malformed)?;
    }
    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok((values[0], values[1], values[2]))
}
