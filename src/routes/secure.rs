// ABOUTME: /secure/* handlers: direct envelope encrypt/decrypt/verify/compute plus attestation
// ABOUTME: All require authentication; attestation additionally requires the is_admin flag
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
use crate::crypto::Envelope;
use crate::errors::{AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::value::Value;

/// `/secure/*` routes.
pub struct SecureRoutes;

impl SecureRoutes {
    /// Build the secure route group.
    #[must_use]
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/secure/encrypt", post(Self::encrypt))
            .route("/secure/decrypt", post(Self::decrypt))
            .route("/secure/verify", post(Self::verify))
            .route("/secure/compute", post(Self::compute))
            .route("/secure/attestation", get(Self::attestation))
    }

    fn require_crypto(state: &AppState) -> AppResult<()> {
        if state.crypto_enabled {
            Ok(())
        } else {
            Err(AppError::unavailable("crypto subsystem is disabled"))
        }
    }

    async fn encrypt(
        State(state): State<AppState>,
        AuthenticatedUser(_): AuthenticatedUser,
        Json(req): Json<EncryptRequest>,
    ) -> AppResult<Response> {
        Self::require_crypto(&state)?;
        let data_id = req.data_id.unwrap_or_else(|| "adhoc".to_owned());
        let crypto = state.crypto.lock().await;
        let envelope = crypto.encrypt(req.data.to_json().to_string().as_bytes(), &data_id)?;
        Ok((StatusCode::OK, Json(json!({"status": "ok", "encrypted_data": envelope}))).into_response())
    }

    async fn decrypt(
        State(state): State<AppState>,
        AuthenticatedUser(_): AuthenticatedUser,
        Json(envelope): Json<Envelope>,
    ) -> AppResult<Response> {
        Self::require_crypto(&state)?;
        let crypto = state.crypto.lock().await;
        let plaintext = crypto.decrypt(&envelope)?;
        let value: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::decrypt_failed(e.to_string()))?;
        Ok((StatusCode::OK, Json(json!({"status": "ok", "decrypted_data": value}))).into_response())
    }

    async fn verify(
        State(state): State<AppState>,
        AuthenticatedUser(_): AuthenticatedUser,
        Json(req): Json<VerifyRequest>,
    ) -> AppResult<Response> {
        Self::require_crypto(&state)?;
        let crypto = state.crypto.lock().await;
        let is_valid = crypto.verify_integrity(req.data.to_json().to_string().as_bytes(), &req.hash_value);
        Ok((StatusCode::OK, Json(json!({"status": "ok", "is_valid": is_valid}))).into_response())
    }

    async fn compute(
        State(state): State<AppState>,
        AuthenticatedUser(_): AuthenticatedUser,
        Json(req): Json<ComputeRequest>,
    ) -> AppResult<Response> {
        Self::require_crypto(&state)?;
        let crypto = state.crypto.lock().await;
        let plaintext = crypto.decrypt(&req.encrypted_data)?;
        let decoded: serde_json::Value = serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::decrypt_failed(e.to_string()))?;

        let items: Vec<(String, Value)> = match Value::from(decoded) {
            Value::Map(map) => map.into_iter().collect(),
            other => vec![("value".to_owned(), other)],
        };

        let mut op_json = req.params.as_object().cloned().unwrap_or_default();
        op_json.insert("op".to_owned(), serde_json::Value::String(req.operation.clone()));
        let op: crate::crypto::ComputeOp = serde_json::from_value(serde_json::Value::Object(op_json))
            .map_err(|e| AppError::invalid_input(format!("unsupported operation: {e}")))?;

        let result = crypto.compute(&op, &items);
        Ok((
            StatusCode::OK,
            Json(json!({"status": "ok", "operation": req.operation, "result": result})),
        )
            .into_response())
    }

    async fn attestation(
        State(state): State<AppState>,
        AuthenticatedUser(user_id): AuthenticatedUser,
    ) -> AppResult<Response> {
        let user = state.catalog.get_user(user_id).await?;
        if !user.is_admin {
            return Err(AppError::forbidden("admin access required"));
        }
        let crypto = state.crypto.lock().await;
        let attestation = crypto.attest();
        Ok((StatusCode::OK, Json(json!({"status": "ok", "attestation_data": attestation}))).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct EncryptRequest {
    data: Value,
    data_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    data: Value,
    hash_value: String,
}

#[derive(Debug, Deserialize)]
struct ComputeRequest {
    operation: String,
    encrypted_data: Envelope,
    #[serde(default)]
    params: serde_json::Value,
}
