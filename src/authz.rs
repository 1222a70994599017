// ABOUTME: Permission-level checks bridging bearer-token identity to Catalog access rules
// ABOUTME: Thin layer: token validation lives in auth::AuthManager, row-level checks live in catalog::Catalog
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use uuid::Uuid;

use crate::auth::AuthManager;
use crate::catalog::{AccessLevel, Catalog};
use crate::errors::AppResult;

/// Extract and validate the bearer token from an `Authorization` header
/// value, returning the authenticated user id.
///
/// # Errors
///
/// Returns [`crate::errors::AppError::unauthenticated`] if the header is
/// missing the `Bearer ` prefix or the token fails validation.
pub fn authenticate(auth_manager: &AuthManager, authorization: Option<&str>) -> AppResult<Uuid> {
    let header = authorization
        .ok_or_else(|| crate::errors::AppError::unauthenticated("missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| crate::errors::AppError::unauthenticated("expected Bearer token"))?;
    Ok(auth_manager.validate_token(token)?)
}

/// Require `required` access for `user_id` on the cell identified by
/// `cell_key`, returning the resolved `Cell` on success.
///
/// # Errors
///
/// Returns [`crate::errors::AppError::not_found`] if the cell does not
/// exist, or [`crate::errors::AppError::forbidden`] if access is
/// insufficient.
pub async fn require_access(
    catalog: &Catalog,
    user_id: Uuid,
    cell_key: &str,
    required: AccessLevel,
) -> AppResult<crate::catalog::Cell> {
    let cell = catalog.find_cell(cell_key).await?;
    catalog.check_access(user_id, cell.id, required).await?;
    Ok(cell)
}
