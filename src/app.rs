// ABOUTME: Dependency-injection container binding every subsystem and the top-level axum router
// ABOUTME: Grounded on the teacher's ServerResources: one Arc<AppStateInner> handed to every route group
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthManager;
use crate::cache::{LiquidCache, LiquidCacheConfig};
use crate::catalog::Catalog;
use crate::cell_store::CellStore;
use crate::config::Settings;
use crate::crypto::CryptoCore;
use crate::events::EventBus;

/// Every dependency the route handlers need, constructed once at startup.
pub struct AppStateInner {
    /// Process-wide settings.
    pub settings: Settings,
    /// Cryptographic core, behind a mutex only because master-key rotation
    /// needs `&mut`; day-to-day encrypt/decrypt/hash take `&self`.
    pub crypto: AsyncMutex<CryptoCore>,
    /// Whether `crypto` is actually in service (mirrors `settings.crypto_enabled`).
    pub crypto_enabled: bool,
    /// Per-cell storage.
    pub cell_store: CellStore,
    /// Users/cells/ownerships/tokens.
    pub catalog: Catalog,
    /// JWT issuance and validation.
    pub auth_manager: AuthManager,
    /// The layered query-result cache, absent when `settings.cache_enabled` is false.
    pub cache: Option<LiquidCache>,
    /// Fire-and-forget event publication.
    pub events: Arc<EventBus>,
    /// Per-cell write serialization (`SPEC_FULL.md` §5: writes to the same
    /// cell are linearizable). Stored as owned `Arc`s so a lock can be
    /// cloned out of the map and awaited without holding the map's
    /// internal shard guard across the `.await`.
    pub write_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

/// Shared application state, cheap to clone (single `Arc`).
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Clone out the `Mutex` guarding writes to `cell_key`, creating it on
    /// first use. Callers should `.lock().await` the result; holding the
    /// returned `Arc` (rather than a `DashMap` reference) across the await
    /// avoids blocking unrelated cells hashed to the same shard.
    pub fn cell_write_lock(&self, cell_key: &str) -> Arc<AsyncMutex<()>> {
        let entry = self
            .write_locks
            .entry(cell_key.to_owned())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())));
        Arc::clone(entry.value())
    }
}

/// Build the full application state from `settings`.
///
/// # Errors
///
/// Returns an error if any subsystem fails to initialize (master key
/// bootstrap, catalog connection, cell directory creation).
pub async fn build_state(settings: Settings) -> Result<AppState> {
    crate::cell_store::ensure_cells_dir(&settings.cells_dir).await?;

    let crypto = CryptoCore::load(&settings.master_key_path)?;
    let catalog = Catalog::connect(&settings.database_url).await?;
    let cell_store = CellStore::new(settings.cells_dir.clone());
    let auth_manager = AuthManager::new(settings.token_signing_key.as_deref(), settings.token_ttl_minutes);

    let cache = settings.cache_enabled.then(|| {
        let patterns_path = crate::cache::patterns::PatternTracker::default_path(&cache_dir(&settings));
        LiquidCache::new(
            LiquidCacheConfig {
                layers: settings.cache_layers,
                ttl: std::time::Duration::from_secs(settings.cache_ttl_secs),
                max_size: settings.cache_size,
            },
            Some(patterns_path.as_path()),
        )
    });

    let events = EventBus::start(events_dir(&settings));

    Ok(Arc::new(AppStateInner {
        crypto_enabled: settings.crypto_enabled,
        crypto: AsyncMutex::new(crypto),
        cell_store,
        catalog,
        auth_manager,
        cache,
        events,
        write_locks: DashMap::new(),
        settings,
    }))
}

fn cache_dir(settings: &Settings) -> PathBuf {
    settings
        .cells_dir
        .parent()
        .map_or_else(|| PathBuf::from("cache"), |p| p.join("cache"))
}

fn events_dir(settings: &Settings) -> PathBuf {
    settings
        .cells_dir
        .parent()
        .map_or_else(|| PathBuf::from("events"), |p| p.join("events"))
}

/// Assemble the full HTTP router over every route group.
#[must_use]
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(crate::routes::auth::AuthRoutes::routes())
        .merge(crate::routes::cells::CellRoutes::routes())
        .merge(crate::routes::secure::SecureRoutes::routes())
        .merge(crate::routes::admin::AdminRoutes::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
