// ABOUTME: AES-256-GCM authenticated encryption producing/consuming the self-describing envelope
// ABOUTME: Envelope shape matches the format in SPEC_FULL.md §6: version, algorithm, data_id, nonce, ciphertext
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::crypto::{ALGORITHM, ENVELOPE_VERSION, NONCE_SIZE};
use crate::crypto::keys::CryptoKeys;
use crate::errors::AppError;

/// The self-describing ciphertext record. Decryption requires the master
/// key plus `data_id`; envelopes carry everything else needed to decrypt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope format version, currently always "1.0".
    pub version: String,
    /// Always "AES-GCM-256" for envelopes this crate produces.
    pub algorithm: String,
    /// Key-derivation context, typically `cell_key:item_key`.
    pub data_id: String,
    /// Base64-encoded 12-byte nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext (includes the 16-byte GCM tag).
    pub ciphertext: String,
}

/// Encrypt `plaintext` under the key derived for `data_id`.
///
/// # Errors
///
/// Returns an error if key derivation or the underlying AEAD call fails.
pub fn encrypt(keys: &CryptoKeys, plaintext: &[u8], data_id: &str) -> Result<Envelope> {
    let key_bytes = keys.derive_key(data_id)?;
    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| anyhow::anyhow!("cipher init failed: {e}"))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    Ok(Envelope {
        version: ENVELOPE_VERSION.to_owned(),
        algorithm: ALGORITHM.to_owned(),
        data_id: data_id.to_owned(),
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Decrypt `envelope`, failing with [`AppError::decrypt_failed`] on tag
/// mismatch, unknown algorithm, or missing/malformed fields.
///
/// # Errors
///
/// Returns [`AppError::decrypt_failed`] for any decryption failure.
pub fn decrypt(keys: &CryptoKeys, envelope: &Envelope) -> Result<Vec<u8>, AppError> {
    if envelope.algorithm != ALGORITHM {
        return Err(AppError::decrypt_failed(format!(
            "unknown algorithm {}",
            envelope.algorithm
        )));
    }

    let key_bytes = keys
        .derive_key(&envelope.data_id)
        .map_err(|e| AppError::decrypt_failed(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| AppError::decrypt_failed(e.to_string()))?;

    let nonce_bytes = BASE64
        .decode(&envelope.nonce)
        .map_err(|_| AppError::decrypt_failed("invalid nonce encoding"))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(AppError::decrypt_failed("invalid nonce length"));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|_| AppError::decrypt_failed("invalid ciphertext encoding"))?;

    cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| AppError::decrypt_failed("authentication tag mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys() -> CryptoKeys {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        CryptoKeys::load_or_generate(&dir.path().join("master.key")).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn round_trip_recovers_plaintext() {
        let keys = keys();
        let envelope = encrypt(&keys, b"hello", "cell:item").unwrap_or_else(|e| panic!("{e}"));
        let recovered = decrypt(&keys, &envelope).unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(recovered, b"hello");
    }

    #[test]
    fn two_encrypts_of_same_plaintext_have_distinct_nonces() {
        let keys = keys();
        let e1 = encrypt(&keys, b"hello", "cell:item").unwrap_or_else(|e| panic!("{e}"));
        let e2 = encrypt(&keys, b"hello", "cell:item").unwrap_or_else(|e| panic!("{e}"));
        assert_ne!(e1.nonce, e2.nonce);
        assert_eq!(decrypt(&keys, &e1).unwrap_or_else(|e| panic!("{e:?}")), b"hello");
        assert_eq!(decrypt(&keys, &e2).unwrap_or_else(|e| panic!("{e:?}")), b"hello");
    }

    #[test]
    fn decrypting_with_wrong_data_id_fails() {
        let keys = keys();
        let mut envelope = encrypt(&keys, b"hello", "d1").unwrap_or_else(|e| panic!("{e}"));
        envelope.data_id = "d2".to_owned();
        assert!(decrypt(&keys, &envelope).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let keys = keys();
        let mut envelope = encrypt(&keys, b"hello", "d").unwrap_or_else(|e| panic!("{e}"));
        let mut bytes = BASE64.decode(&envelope.ciphertext).unwrap_or_else(|e| panic!("{e}"));
        bytes[0] ^= 0xFF;
        envelope.ciphertext = BASE64.encode(bytes);
        assert!(decrypt(&keys, &envelope).is_err());
    }
}
