// ABOUTME: /cells/* handlers: create, list, read metadata, item CRUD, and query
// ABOUTME: Control flow follows SPEC_FULL.md §2: AuthZ -> cache probe -> CellStore -> CryptoCore -> QueryEngine -> cache populate -> EventBus
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::authz;
use crate::catalog::{AccessLevel, CellView};
use crate::errors::{AppError, AppResult};
use crate::events::Stream;
use crate::middleware::AuthenticatedUser;
use crate::query::Query;
use crate::value::Value;

/// `/cells/*` routes.
pub struct CellRoutes;

impl CellRoutes {
    /// Build the cell route group.
    #[must_use]
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/cells", post(Self::create_cell).get(Self::list_cells))
            .route("/cells/:key", get(Self::get_cell))
            .route("/cells/:key/keys", get(Self::list_keys))
            .route("/cells/:key/data", post(Self::put_item))
            .route(
                "/cells/:key/data/:item",
                get(Self::get_item).delete(Self::delete_item),
            )
            .route("/cells/:key/query", post(Self::query_cell))
    }

    async fn create_cell(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Json(req): Json<CreateCellRequest>,
    ) -> AppResult<Response> {
        let cell = state.catalog.create_cell(user_id, &req.password).await?;

        state.events.publish(
            Stream::Cell,
            "cell.created",
            json!({"cell_key": cell.key, "owner": user_id}),
        );

        Ok((StatusCode::CREATED, Json(CellView::from(&cell))).into_response())
    }

    async fn list_cells(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
    ) -> AppResult<Response> {
        let cells = state.catalog.list_cells(user_id).await?;
        let views: Vec<CellView> = cells.iter().map(CellView::from).collect();
        Ok((StatusCode::OK, Json(views)).into_response())
    }

    async fn get_cell(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path(key): Path<String>,
    ) -> AppResult<Response> {
        let cell = authz::require_access(&state.catalog, user_id, &key, AccessLevel::Read).await?;
        Ok((StatusCode::OK, Json(CellView::from(&cell))).into_response())
    }

    async fn list_keys(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path(key): Path<String>,
    ) -> AppResult<Response> {
        authz::require_access(&state.catalog, user_id, &key, AccessLevel::Read).await?;
        let keys = state.cell_store.list_keys(&key).await?;
        Ok((StatusCode::OK, Json(json!({"keys": keys}))).into_response())
    }

    async fn put_item(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path(key): Path<String>,
        Json(req): Json<PutItemRequest>,
    ) -> AppResult<Response> {
        authz::require_access(&state.catalog, user_id, &key, AccessLevel::Write).await?;

        let lock = state.cell_write_lock(&key);
        let _guard = lock.lock().await;

        let data_id = format!("{key}:{}", req.key);
        let (stored, encrypted) = if state.crypto_enabled {
            let crypto = state.crypto.lock().await;
            let envelope = crypto.encrypt(req.value.to_json().to_string().as_bytes(), &data_id)?;
            (serde_json::to_string(&envelope)?, true)
        } else {
            (req.value.to_json().to_string(), false)
        };

        state.cell_store.put(&key, &req.key, &stored).await?;

        if let Some(cache) = &state.cache {
            let _ = cache.invalidate_related(&format!("cell_{key}*"));
        }

        state.events.publish(
            Stream::Cell,
            "cell.item_written",
            json!({"cell_key": key, "item_key": req.key}),
        );

        Ok((StatusCode::OK, Json(json!({"status": "ok", "encrypted": encrypted}))).into_response())
    }

    async fn get_item(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path((key, item)): Path<(String, String)>,
    ) -> AppResult<Response> {
        authz::require_access(&state.catalog, user_id, &key, AccessLevel::Read).await?;

        let cache_key = state
            .cache
            .as_ref()
            .map(|cache| crate::cache::LiquidCache::fingerprint("get_item", &json!({"cell": key, "item": item})));
        let pattern = crate::cache::LiquidCache::register_query(&key, "items", "get_item", None, None);

        if let (Some(cache), Some(cache_key)) = (&state.cache, &cache_key) {
            if let Some(cached) = cache.get(cache_key, &pattern) {
                return Ok((StatusCode::OK, Json(cached)).into_response());
            }
        }

        let stored = state.cell_store.get(&key, &item).await?;
        let value = Self::decrypt_stored(&state, &stored.value).await?;

        let body = json!({"key": item, "value": value.to_json()});

        if let (Some(cache), Some(cache_key)) = (&state.cache, &cache_key) {
            cache.put(cache_key, body.clone(), Some(format!("cell_{key}")), false);
        }

        Ok((StatusCode::OK, Json(body)).into_response())
    }

    async fn delete_item(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path((key, item)): Path<(String, String)>,
    ) -> AppResult<Response> {
        authz::require_access(&state.catalog, user_id, &key, AccessLevel::Write).await?;

        let lock = state.cell_write_lock(&key);
        let _guard = lock.lock().await;

        state.cell_store.delete(&key, &item).await?;

        if let Some(cache) = &state.cache {
            let _ = cache.invalidate_related(&format!("cell_{key}*"));
        }

        state.events.publish(
            Stream::Cell,
            "cell.item_deleted",
            json!({"cell_key": key, "item_key": item}),
        );

        Ok((StatusCode::OK, Json(json!({"status": "ok"}))).into_response())
    }

    async fn query_cell(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
        Path(key): Path<String>,
        Json(query): Json<Query>,
    ) -> AppResult<Response> {
        authz::require_access(&state.catalog, user_id, &key, AccessLevel::Read).await?;
        query.validate().map_err(AppError::invalid_input)?;

        let cache_key = state
            .cache
            .as_ref()
            .map(|cache| crate::cache::LiquidCache::fingerprint("query", &json!({"cell": key, "query": &query})));
        let pattern =
            crate::cache::LiquidCache::register_query(&key, "items", "query", query.limit, query.sort.as_deref());

        if let (Some(cache), Some(cache_key)) = (&state.cache, &cache_key) {
            if let Some(cached) = cache.get(cache_key, &pattern) {
                return Ok((StatusCode::OK, Json(cached)).into_response());
            }
        }

        let rows = state.cell_store.scan(&key).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let value = Self::decrypt_stored(&state, &row.value)
                .await
                .unwrap_or_else(|_| Value::from(json!({"decryption_failed": true, "encrypted_data": row.value})));
            items.push(value);
        }

        let results = crate::query::evaluate(&query, &items);
        let count = results.len();
        let body = json!({"results": results.into_iter().map(Value::to_json).collect::<Vec<_>>(), "count": count});

        if let (Some(cache), Some(cache_key)) = (&state.cache, &cache_key) {
            cache.put(cache_key, body.clone(), Some(format!("cell_{key}")), false);
        }

        Ok((StatusCode::OK, Json(body)).into_response())
    }

    async fn decrypt_stored(state: &AppState, stored: &str) -> AppResult<Value> {
        if state.crypto_enabled {
            let envelope: crate::crypto::Envelope = serde_json::from_str(stored)?;
            let crypto = state.crypto.lock().await;
            let plaintext = crypto.decrypt(&envelope)?;
            let json: serde_json::Value = serde_json::from_slice(&plaintext)
                .map_err(|e| AppError::decrypt_failed(e.to_string()))?;
            Ok(Value::from(json))
        } else {
            let json: serde_json::Value = serde_json::from_str(stored)?;
            Ok(Value::from(json))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateCellRequest {
    password: String,
}

#[derive(Debug, Deserialize)]
struct PutItemRequest {
    key: String,
    value: Value,
}
