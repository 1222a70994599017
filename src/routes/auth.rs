// ABOUTME: /auth/register and /auth/login handlers
// ABOUTME: Unauthenticated routes; login issues the bearer token every other route requires
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::catalog::UserView;
use crate::errors::AppResult;
use crate::events::Stream;

/// `/auth/*` routes.
pub struct AuthRoutes;

impl AuthRoutes {
    /// Build the auth route group.
    #[must_use]
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/auth/register", post(Self::register))
            .route("/auth/login", post(Self::login))
    }

    async fn register(
        State(state): State<AppState>,
        Json(req): Json<RegisterRequest>,
    ) -> AppResult<Response> {
        let user = state
            .catalog
            .register_user(&req.email, &req.username, &req.password)
            .await?;

        state.events.publish(
            Stream::User,
            "user.registered",
            serde_json::json!({"user_id": user.id}),
        );

        Ok((StatusCode::CREATED, Json(UserView::from(&user))).into_response())
    }

    async fn login(
        State(state): State<AppState>,
        Json(req): Json<LoginRequest>,
    ) -> AppResult<Response> {
        let user = state
            .catalog
            .authenticate(&req.email, &req.password)
            .await?
            .ok_or_else(|| crate::errors::AppError::unauthenticated("invalid email or password"))?;

        let access_token = state.auth_manager.generate_token(user.id)?;

        state.events.publish(
            Stream::User,
            "user.login",
            serde_json::json!({"user_id": user.id}),
        );

        Ok((
            StatusCode::OK,
            Json(LoginResponse {
                access_token,
                token_type: "bearer".to_owned(),
                user_id: user.id,
                username: user.username,
                email: user.email,
                is_admin: user.is_admin,
            }),
        )
            .into_response())
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: String,
    user_id: uuid::Uuid,
    username: String,
    email: String,
    is_admin: bool,
}
