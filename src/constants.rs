// ABOUTME: Central home for tunable constants shared across crypto, cache, and auth subsystems
// ABOUTME: Values chosen to match the documented behavior of the source this crate was distilled from
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Crypto core constants: key sizes, rotation interval, PBKDF2 parameters.
pub mod crypto {
    /// AES-256-GCM key length in bytes.
    pub const KEY_SIZE: usize = 32;
    /// AES-GCM nonce length in bytes.
    pub const NONCE_SIZE: usize = 12;
    /// AES-GCM authentication tag length in bytes.
    pub const TAG_SIZE: usize = 16;
    /// How often the derived-key cache is flushed (seconds). 24 hours.
    pub const ROTATION_INTERVAL_SECS: u64 = 86_400;
    /// PBKDF2-SHA256 iteration count used for deliberate master-key rotation.
    pub const PBKDF2_ITERATIONS: u32 = 10_000;
    /// Salt length used for PBKDF2-based master key re-derivation.
    pub const PBKDF2_SALT_SIZE: usize = 16;
    /// Envelope format version string.
    pub const ENVELOPE_VERSION: &str = "1.0";
    /// Envelope algorithm tag.
    pub const ALGORITHM: &str = "AES-GCM-256";
}

/// Password hashing constants (Argon2id), matched to the source's
/// `advanced_security.py` configuration.
pub mod password {
    /// Argon2 time cost (iterations).
    pub const TIME_COST: u32 = 2;
    /// Argon2 memory cost in KiB.
    pub const MEMORY_COST_KIB: u32 = 65_536;
    /// Argon2 parallelism (lanes).
    pub const PARALLELISM: u32 = 4;
    /// Derived key length in bytes.
    pub const HASH_LEN: usize = 32;
    /// Random salt length in bytes.
    pub const SALT_LEN: usize = 16;
    /// Failed logins allowed before lockout.
    pub const MAX_LOGIN_ATTEMPTS: u32 = 5;
    /// Lockout duration once `MAX_LOGIN_ATTEMPTS` is exceeded.
    pub const LOCKOUT_DURATION_MINUTES: i64 = 30;
}

/// Token issuance constants.
pub mod token {
    /// Default JWT lifetime in minutes.
    pub const DEFAULT_TTL_MINUTES: i64 = 60;
}

/// Liquid cache constants: layer thresholds, TTL, persistence cadence.
pub mod cache {
    /// Default number of cache layers (0 = hottest).
    pub const DEFAULT_LAYERS: usize = 3;
    /// Default per-entry TTL in seconds (30 minutes).
    pub const DEFAULT_TTL_SECS: u64 = 1_800;
    /// Default max entries across all layers.
    pub const DEFAULT_MAX_SIZE: usize = 10_000;
    /// Score threshold to promote an entry into layer 0.
    pub const SCORE_LAYER_0: f64 = 10.0;
    /// Score threshold to promote an entry into layer 1.
    pub const SCORE_LAYER_1: f64 = 5.0;
    /// Score threshold to promote an entry into layer 2.
    pub const SCORE_LAYER_2: f64 = 1.0;
    /// Successor frequency above which a pattern is considered "likely next".
    pub const LIKELY_NEXT_THRESHOLD: f64 = 0.3;
    /// Successor frequency above which a preload hint is eligible for
    /// actual background preload (stricter than `LIKELY_NEXT_THRESHOLD`).
    pub const PRELOAD_THRESHOLD: f64 = 0.7;
    /// Minimum observation count before a pattern is persisted.
    pub const PERSIST_MIN_COUNT: u64 = 3;
    /// Persist patterns every this many total observations.
    pub const PERSIST_EVERY: u64 = 100;
}

/// Event bus constants.
pub mod events {
    /// Bounded in-memory queue capacity per stream before drop-oldest kicks in.
    pub const QUEUE_CAPACITY: usize = 4_096;
}

/// Service identity used in structured logs.
pub mod service_names {
    /// Canonical service name reported in logs and attestation payloads.
    pub const CELLS_SERVER: &str = "cells-server";
}

/// Query engine constants.
pub mod query {
    /// Row count above which a columnar backend would be considered
    /// (see `SPEC_FULL.md` §4.4); this crate has a single evaluator whose
    /// output is documented to be swap-compatible at this threshold.
    pub const COLUMNAR_THRESHOLD: usize = 10_000;
}
