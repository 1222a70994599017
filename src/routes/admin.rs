// ABOUTME: /admin/stats and /admin/cache/* handlers, gated on the caller's is_admin flag
// ABOUTME: Surfaces cache effectiveness and exposes manual invalidation/rotation operations
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::middleware::AuthenticatedUser;

/// `/admin/*` routes.
pub struct AdminRoutes;

impl AdminRoutes {
    /// Build the admin route group.
    #[must_use]
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/admin/stats", get(Self::stats))
            .route("/admin/cache/stats", get(Self::cache_stats))
            .route("/admin/cache/invalidate", post(Self::cache_invalidate))
            .route("/admin/rotate-master-key", post(Self::rotate_master_key))
    }

    async fn require_admin(state: &AppState, user_id: uuid::Uuid) -> AppResult<()> {
        let user = state.catalog.get_user(user_id).await?;
        if user.is_admin {
            Ok(())
        } else {
            Err(AppError::forbidden("admin access required"))
        }
    }

    async fn stats(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
    ) -> AppResult<Response> {
        Self::require_admin(&state, user_id).await?;

        let cache_stats = state.cache.as_ref().map(crate::cache::LiquidCache::stats);
        let body = json!({
            "crypto_enabled": state.crypto_enabled,
            "cache_enabled": state.cache.is_some(),
            "cache": cache_stats,
            "events_dropped": state.events.dropped_count(),
        });
        Ok((StatusCode::OK, Json(body)).into_response())
    }

    async fn cache_stats(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
    ) -> AppResult<Response> {
        Self::require_admin(&state, user_id).await?;

        let Some(cache) = &state.cache else {
            return Err(AppError::unavailable("cache subsystem is disabled"));
        };
        Ok((StatusCode::OK, Json(cache.stats())).into_response())
    }

    async fn cache_invalidate(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Json(req): Json<InvalidateRequest>,
    ) -> AppResult<Response> {
        Self::require_admin(&state, user_id).await?;

        let Some(cache) = &state.cache else {
            return Err(AppError::unavailable("cache subsystem is disabled"));
        };
        let removed = cache
            .invalidate_related(&req.pattern)
            .map_err(|e| AppError::invalid_input(e.to_string()))?;
        Ok((StatusCode::OK, Json(json!({"removed": removed}))).into_response())
    }

    async fn rotate_master_key(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
    ) -> AppResult<Response> {
        Self::require_admin(&state, user_id).await?;

        if !state.crypto_enabled {
            return Err(AppError::unavailable("crypto subsystem is disabled"));
        }
        let mut crypto = state.crypto.lock().await;
        crypto.rotate_master()?;
        tracing::warn!("master key rotated by admin request: previously encrypted items are now unreadable");
        Ok((StatusCode::OK, Json(json!({"status": "rotated"}))).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    pattern: String,
}
