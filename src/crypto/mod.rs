// ABOUTME: CryptoCore facade: key derivation, AEAD, hashing, encrypted-domain compute, attestation
// ABOUTME: Ties together the keys/envelope/hashing/compute/attestation submodules behind one type
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod attestation;
pub mod compute;
pub mod envelope;
pub mod hashing;
pub mod keys;

use std::path::Path;

use anyhow::Result;

pub use attestation::{attest, Attestation};
pub use compute::{run as run_compute, ComputeOp, ComputeResult};
pub use envelope::Envelope;
pub use keys::CryptoKeys;

use crate::errors::AppError;

/// The cryptographic core exposed to the rest of the service.
pub struct CryptoCore {
    keys: CryptoKeys,
}

impl CryptoCore {
    /// Load (or bootstrap) the master secret at `master_key_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the master key cannot be loaded or generated.
    pub fn load(master_key_path: &Path) -> Result<Self> {
        Ok(Self {
            keys: CryptoKeys::load_or_generate(master_key_path)?,
        })
    }

    /// Encrypt `plaintext` under `data_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8], data_id: &str) -> Result<Envelope> {
        envelope::encrypt(&self.keys, plaintext, data_id)
    }

    /// Decrypt `env`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::decrypt_failed`] on any decryption failure.
    pub fn decrypt(&self, env: &Envelope) -> Result<Vec<u8>, AppError> {
        envelope::decrypt(&self.keys, env)
    }

    /// `HMAC-SHA512(master, data)` as lowercase hex.
    #[must_use]
    pub fn hash(&self, data: &[u8]) -> String {
        hashing::hash(&self.keys, data)
    }

    /// Constant-time comparison of `hash(value)` against `expected_hex`.
    #[must_use]
    pub fn verify_integrity(&self, value: &[u8], expected_hex: &str) -> bool {
        hashing::verify_integrity(&self.keys, value, expected_hex)
    }

    /// Run an encrypted-domain compute operation over already-decrypted
    /// items (decryption is the caller's responsibility, typically via
    /// [`Self::decrypt`] applied to a scan result).
    #[must_use]
    pub fn compute(&self, op: &ComputeOp, items: &[(String, crate::value::Value)]) -> ComputeResult {
        compute::run(op, items)
    }

    /// Current attestation payload.
    #[must_use]
    pub fn attest(&self) -> Attestation {
        attestation::attest()
    }

    /// Deliberately rotate the master secret. Admin-only; destroys access
    /// to previously encrypted items.
    ///
    /// # Errors
    ///
    /// Returns an error if the new secret cannot be persisted.
    pub fn rotate_master(&mut self) -> Result<()> {
        self.keys.rotate_master()
    }
}
