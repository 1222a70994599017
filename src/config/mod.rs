// ABOUTME: Environment-driven configuration for deployment-specific settings
// ABOUTME: Parses the environment variables named in the external interface specification
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Process-wide settings, loaded once at startup from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Control-plane catalog connection string (users/cells/ownerships).
    pub database_url: String,
    /// Path to the persisted master secret file.
    pub master_key_path: PathBuf,
    /// Root directory under which each cell's `data.db` lives.
    pub cells_dir: PathBuf,
    /// Whether at-rest encryption is active. When `false`, `/secure/*` and
    /// any write path that requires crypto returns `Unavailable`.
    pub crypto_enabled: bool,
    /// Whether the Liquid Cache is active.
    pub cache_enabled: bool,
    /// Max entries across all cache layers.
    pub cache_size: usize,
    /// Per-entry cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Number of cache layers.
    pub cache_layers: usize,
    /// Optional bootstrap endpoint for the event bus message-broker adapter.
    /// Unset means the in-process ring-buffer implementation is used.
    pub event_bus_bootstrap: Option<String>,
    /// Base64-encoded JWT signing secret, if provided.
    pub token_signing_key: Option<String>,
    /// JWT lifetime in minutes.
    pub token_ttl_minutes: i64,
    /// HTTP bind host.
    pub server_host: String,
    /// HTTP bind port.
    pub http_port: u16,
}

impl Settings {
    /// Load settings from the process environment, applying the same
    /// defaults the specification names.
    ///
    /// # Errors
    ///
    /// Returns an error if a provided numeric environment variable cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:catalog.db".to_owned()),
            master_key_path: env::var("MASTER_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sealed_data/master.key")),
            cells_dir: env::var("CELLS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cells")),
            crypto_enabled: parse_bool_env("CRYPTO_ENABLED", true)?,
            cache_enabled: parse_bool_env("CACHE_ENABLED", true)?,
            cache_size: parse_env("CACHE_SIZE", crate::constants::cache::DEFAULT_MAX_SIZE)?,
            cache_ttl_secs: parse_env("CACHE_TTL", crate::constants::cache::DEFAULT_TTL_SECS)?,
            cache_layers: parse_env("CACHE_LAYERS", crate::constants::cache::DEFAULT_LAYERS)?,
            event_bus_bootstrap: env::var("EVENT_BUS_BOOTSTRAP").ok(),
            token_signing_key: env::var("TOKEN_SIGNING_KEY").ok(),
            token_ttl_minutes: parse_env(
                "TOKEN_TTL_MINUTES",
                crate::constants::token::DEFAULT_TTL_MINUTES,
            )?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned()),
            http_port: parse_env("HTTP_PORT", 8080u16)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => anyhow::bail!("invalid boolean for {key}: {other}"),
        },
        Err(_) => Ok(default),
    }
}
