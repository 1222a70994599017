// ABOUTME: HMAC-SHA512 hashing and constant-time integrity verification
// ABOUTME: Mirrors the source's secure_hash/verify_data_integrity pair (hmac.compare_digest)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::crypto::keys::CryptoKeys;

type HmacSha512 = Hmac<Sha512>;

/// `HMAC-SHA512(master, data)` as lowercase hex.
///
/// # Panics
///
/// Never panics in practice: `HmacSha512::new_from_slice` only fails for
/// key lengths HMAC rejects, and the master key is always 32 bytes.
#[must_use]
pub fn hash(keys: &CryptoKeys, data: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(keys.master())
        .unwrap_or_else(|_| unreachable!("32-byte key is always valid for HMAC-SHA512"));
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of `hash(value)` against `expected_hex`.
#[must_use]
pub fn verify_integrity(keys: &CryptoKeys, value: &[u8], expected_hex: &str) -> bool {
    let actual = hash(keys, value);
    actual.as_bytes().ct_eq(expected_hex.as_bytes()).into()
}
