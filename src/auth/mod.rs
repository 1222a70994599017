// ABOUTME: JWT issuance and validation for the Catalog's token-based authentication
// ABOUTME: Grounded on the teacher's AuthManager: HS256, atomic-counter-folded uniqueness, detailed validation errors
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Claims encoded in issued tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated user's id.
    pub sub: String,
    /// Issued-at, unix seconds. A monotonic counter is folded in to
    /// guarantee uniqueness for tokens issued within the same second.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and validates bearer tokens.
pub struct AuthManager {
    secret: Vec<u8>,
    ttl_minutes: i64,
    counter: AtomicU64,
}

impl AuthManager {
    /// Build a manager from a base64-encoded secret, or generate and log a
    /// development warning if none is configured.
    #[must_use]
    pub fn new(signing_key_b64: Option<&str>, ttl_minutes: i64) -> Self {
        let secret = signing_key_b64.map_or_else(
            || {
                tracing::warn!("no TOKEN_SIGNING_KEY set, generating an ephemeral one (development default)");
                generate_signing_key()
            },
            |encoded| {
                use base64::engine::general_purpose::STANDARD as BASE64;
                use base64::Engine as _;
                BASE64.decode(encoded).unwrap_or_else(|_| generate_signing_key())
            },
        );

        Self {
            secret,
            ttl_minutes,
            counter: AtomicU64::new(0),
        }
    }

    /// Issue a token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn generate_token(&self, user_id: Uuid) -> Result<String> {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let iat = now.timestamp() + i64::try_from(counter % 1000).unwrap_or(0);
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    /// Validate `token`, returning the subject's user id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::unauthenticated`] for any invalid, expired, or
    /// malformed token.
    pub fn validate_token(&self, token: &str) -> Result<Uuid, AppError> {
        let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| AppError::unauthenticated(format!("invalid token: {e}")))?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::unauthenticated("malformed subject claim"))
    }
}

fn generate_signing_key() -> Vec<u8> {
    let mut key = vec![0u8; 64];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_generates_and_validates() {
        let mgr = AuthManager::new(None, 60);
        let user_id = Uuid::new_v4();
        let token = mgr.generate_token(user_id).unwrap_or_else(|e| panic!("{e}"));
        let validated = mgr.validate_token(&token).unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(validated, user_id);
    }

    #[test]
    fn garbage_token_is_unauthenticated() {
        let mgr = AuthManager::new(None, 60);
        assert!(mgr.validate_token("not-a-jwt").is_err());
    }
}
