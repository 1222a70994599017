// ABOUTME: Bearer-token authentication extractor, wiring the Authorization header into handler signatures
// ABOUTME: Simplified relative to the teacher's McpAuthMiddleware: single auth method (JWT), no API keys or JWKS
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;

/// The authenticated user's id, extractable directly in handler signatures
/// as `AuthenticatedUser(user_id): AuthenticatedUser`.
pub struct AuthenticatedUser(pub Uuid);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    #[tracing::instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let user_id = crate::authz::authenticate(&state.auth_manager, header)?;
        tracing::debug!(%user_id, "request authenticated");
        Ok(Self(user_id))
    }
}
