// ABOUTME: Main HTTP server binary: loads Settings, builds AppState, serves the axum router
// ABOUTME: Grounded on the teacher's multitenant server binary: bind, axum::serve, graceful shutdown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use cells_server::app;
use cells_server::config::Settings;
use cells_server::logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let settings = Settings::from_env()?;
    let addr = format!("{}:{}", settings.server_host, settings.http_port);

    let state = app::build_state(settings).await?;
    let router = app::build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "cells-server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("cells-server shut down");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM — whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
