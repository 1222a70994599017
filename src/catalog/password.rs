// ABOUTME: Argon2id password hashing with parameters matched to the source's security configuration
// ABOUTME: time_cost=2, memory_cost=64MiB, parallelism=4, hash_len=32, salt_len=16
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use anyhow::{Context, Result};

use crate::constants::password::{HASH_LEN, MEMORY_COST_KIB, PARALLELISM, TIME_COST};

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(HASH_LEN))
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash `password`, returning the PHC-formatted verifier suitable for
/// storage in `User::password_hash`.
///
/// # Errors
///
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = hasher()?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify `password` against a stored PHC-formatted `hash`.
///
/// # Errors
///
/// Returns an error if `hash` is not a valid PHC string (corrupted data),
/// as distinct from a simple mismatch which returns `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).context("stored password hash is malformed")?;
    let argon2 = hasher()?;
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = hash_password("Abcdefg1").unwrap_or_else(|e| panic!("{e}"));
        assert!(verify_password("Abcdefg1", &hash).unwrap_or_else(|e| panic!("{e}")));
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hash = hash_password("Abcdefg1").unwrap_or_else(|e| panic!("{e}"));
        assert!(!verify_password("wrong", &hash).unwrap_or_else(|e| panic!("{e}")));
    }
}
