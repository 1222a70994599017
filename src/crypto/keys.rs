// ABOUTME: Master secret lifecycle and deterministic per-item key derivation
// ABOUTME: HMAC-SHA256(master, data_id) derivation with a rotation-cleared cache, two-tier like the teacher's MEK/DEK split
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::constants::crypto::{KEY_SIZE, PBKDF2_ITERATIONS, PBKDF2_SALT_SIZE, ROTATION_INTERVAL_SECS};

type HmacSha256 = Hmac<Sha256>;

/// Holds the 32-byte master secret and the derived-key cache, mirroring the
/// teacher's `MasterEncryptionKey`/`KeyManager` two-tier pattern but adapted
/// to this crate's single-secret, deterministic-derivation design.
pub struct CryptoKeys {
    master: [u8; KEY_SIZE],
    path: PathBuf,
    cache: Mutex<HashMap<String, [u8; KEY_SIZE]>>,
    last_rotation: Mutex<Instant>,
}

impl CryptoKeys {
    /// Load the master secret from `path`, generating and persisting one
    /// with `0o600` permissions if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not valid
    /// base64 of the expected length, or if the file cannot be created.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        let master = if path.exists() {
            let encoded = fs::read_to_string(path)
                .with_context(|| format!("reading master key from {}", path.display()))?;
            let bytes = BASE64
                .decode(encoded.trim())
                .context("master key file is not valid base64")?;
            let mut key = [0u8; KEY_SIZE];
            if bytes.len() != KEY_SIZE {
                anyhow::bail!("master key file has unexpected length {}", bytes.len());
            }
            key.copy_from_slice(&bytes);
            key
        } else {
            tracing::warn!(
                path = %path.display(),
                "no master key found, generating a new one (development default)"
            );
            let mut key = [0u8; KEY_SIZE];
            rand::thread_rng().fill_bytes(&mut key);
            persist_master_key(path, &key)?;
            key
        };

        Ok(Self {
            master,
            path: path.to_path_buf(),
            cache: Mutex::new(HashMap::new()),
            last_rotation: Mutex::new(Instant::now()),
        })
    }

    /// `derive_key(data_id) = HMAC-SHA256(master, data_id_bytes)`, cached
    /// per `data_id` until the next cache flush.
    ///
    /// # Errors
    ///
    /// Returns an error only if the internal cache mutex is poisoned.
    pub fn derive_key(&self, data_id: &str) -> Result<[u8; KEY_SIZE]> {
        self.flush_if_due();

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("derived key cache lock poisoned"))?;
        if let Some(key) = cache.get(data_id) {
            return Ok(*key);
        }

        let mut mac = HmacSha256::new_from_slice(&self.master)
            .map_err(|e| anyhow::anyhow!("hmac init failed: {e}"))?;
        mac.update(data_id.as_bytes());
        let result = mac.finalize().into_bytes();
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&result);
        cache.insert(data_id.to_owned(), key);
        Ok(key)
    }

    /// Flush the derived-key cache if `ROTATION_INTERVAL_SECS` has elapsed
    /// since the last flush. This is the automatic, non-destructive rotation
    /// path described in `SPEC_FULL.md` §4.1 — it never touches the master
    /// secret itself.
    fn flush_if_due(&self) {
        let Ok(mut last) = self.last_rotation.lock() else {
            return;
        };
        if last.elapsed() >= Duration::from_secs(ROTATION_INTERVAL_SECS) {
            if let Ok(mut cache) = self.cache.lock() {
                cache.clear();
            }
            *last = Instant::now();
        }
    }

    /// Deliberately rotate the master secret itself via
    /// PBKDF2-SHA256(old_master, random_salt, 10 000 iterations). This is a
    /// destructive admin operation: items encrypted under the old master
    /// become unreadable, so it is never invoked automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the new master secret cannot be persisted.
    pub fn rotate_master(&mut self) -> Result<()> {
        let mut salt = [0u8; PBKDF2_SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut new_master = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.master, &salt, PBKDF2_ITERATIONS, &mut new_master);

        persist_master_key(&self.path, &new_master)?;
        self.master = new_master;
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        tracing::warn!("master secret rotated; previously encrypted items are now unreadable");
        Ok(())
    }

    /// Raw master secret bytes, used by hashing and envelope encryption.
    pub(crate) const fn master(&self) -> &[u8; KEY_SIZE] {
        &self.master
    }
}

fn persist_master_key(path: &Path, key: &[u8; KEY_SIZE]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating master key directory {}", parent.display()))?;
    }
    let encoded = BASE64.encode(key);
    fs::write(path, encoded).with_context(|| format!("writing master key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("chmod 600 on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        tracing::warn!("skipping chmod 600 on master key file: not a unix target");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_and_reloads_same_master() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let path = dir.path().join("master.key");
        let keys1 = CryptoKeys::load_or_generate(&path).unwrap_or_else(|e| panic!("{e}"));
        let key1 = keys1.derive_key("cell:item").unwrap_or_else(|e| panic!("{e}"));

        let keys2 = CryptoKeys::load_or_generate(&path).unwrap_or_else(|e| panic!("{e}"));
        let key2 = keys2.derive_key("cell:item").unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(key1, key2, "derive_key must be deterministic across reloads");
    }

    #[test]
    fn derive_key_differs_by_data_id() {
        let dir = tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let keys = CryptoKeys::load_or_generate(&dir.path().join("master.key"))
            .unwrap_or_else(|e| panic!("{e}"));
        let a = keys.derive_key("a").unwrap_or_else(|e| panic!("{e}"));
        let b = keys.derive_key("b").unwrap_or_else(|e| panic!("{e}"));
        assert_ne!(a, b);
    }
}
