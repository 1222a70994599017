// ABOUTME: Builds a fully wired AppState/Router against a scratch directory and in-memory catalog
// ABOUTME: Used by end-to-end tests that need a real axum router without binding a socket

use cells_server::app::{self, AppState};
use cells_server::config::Settings;

/// A running test app plus the scratch directory it owns. Keep the
/// `TempDir` alive for as long as the router is in use.
pub struct TestApp {
    pub router: axum::Router,
    pub state: AppState,
    _tempdir: tempfile::TempDir,
}

/// Boots a full [`AppState`]/router pair: in-memory catalog, a scratch
/// cells directory, crypto and cache both enabled.
pub async fn spawn_app() -> TestApp {
    let tempdir = tempfile::tempdir().expect("create tempdir");

    let settings = Settings {
        database_url: "sqlite::memory:".to_owned(),
        master_key_path: tempdir.path().join("master.key"),
        cells_dir: tempdir.path().join("cells"),
        crypto_enabled: true,
        cache_enabled: true,
        cache_size: 256,
        cache_ttl_secs: 1800,
        cache_layers: 3,
        event_bus_bootstrap: None,
        token_signing_key: None,
        token_ttl_minutes: 60,
        server_host: "127.0.0.1".to_owned(),
        http_port: 0,
    };

    let state = app::build_state(settings).await.expect("build app state");
    let router = app::build_router(state.clone());

    TestApp { router, state, _tempdir: tempdir }
}
