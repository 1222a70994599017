// ABOUTME: Catalog: users, cells, and cell ownerships backed by a relational store
// ABOUTME: Implements register/authenticate/create_cell/list_cells/check_access plus login lockout
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

pub mod models;
pub mod password;

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub use models::{Cell, CellView, PermissionLevel, User, UserView};

use crate::constants::password::{LOCKOUT_DURATION_MINUTES, MAX_LOGIN_ATTEMPTS};
use crate::errors::{AppError, AppResult};

/// Required access level for a cell operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Any ownership row suffices.
    Read,
    /// Requires owner or editor permission.
    Write,
}

struct LoginAttempts {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

/// The control-plane catalog: users, cells, ownerships, and login lockout
/// tracking. Backed by a `sqlx` SQLite pool.
pub struct Catalog {
    pool: SqlitePool,
    login_attempts: DashMap<Uuid, Mutex<LoginAttempts>>,
}

impl Catalog {
    /// Connect to `database_url`, creating schema if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema migration fails.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(AppError::from)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(AppError::from)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cells (
                id TEXT PRIMARY KEY,
                key TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(AppError::from)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cell_ownerships (
                user_id TEXT NOT NULL,
                cell_id TEXT NOT NULL,
                permission_level TEXT NOT NULL,
                PRIMARY KEY (user_id, cell_id)
            )",
        )
        .execute(&pool)
        .await
        .map_err(AppError::from)?;

        Ok(Self {
            pool,
            login_attempts: DashMap::new(),
        })
    }

    /// Register a new user with an Argon2id-hashed password.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::conflict`] if the email or username is already
    /// taken, or a transient error on storage failure.
    pub async fn register_user(&self, email: &str, username: &str, password: &str) -> AppResult<User> {
        let password_hash =
            password::hash_password(password).map_err(|e| AppError::invalid_input(e.to_string()))?;
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        crate::retry::with_retry(|| async {
            sqlx::query(
                "INSERT INTO users (id, email, username, password_hash, is_active, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)",
            )
            .bind(id.to_string())
            .bind(email)
            .bind(username)
            .bind(&password_hash)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    AppError::conflict("email or username already registered")
                }
                other => AppError::from(other),
            })?;
            Ok(())
        })
        .await?;

        Ok(User {
            id,
            email: email.to_owned(),
            username: username.to_owned(),
            password_hash,
            is_active: true,
            is_admin: false,
            created_at,
        })
    }

    /// Authenticate by email/password, honoring the account lockout state
    /// machine (`SPEC_FULL.md` §4.8). Returns `Ok(None)` for a plain
    /// credential mismatch (not locked out).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::rate_limited`] if the account is currently
    /// locked out, or a transient error on storage failure.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };

        if let Some(locked_until) = self.locked_until(user.id) {
            if locked_until > Utc::now() {
                return Err(AppError::rate_limited("account temporarily locked"));
            }
        }

        let verified = password::verify_password(password, &user.password_hash)
            .map_err(|e| AppError::invalid_input(e.to_string()))?;

        if verified {
            self.login_attempts.remove(&user.id);
            Ok(Some(user))
        } else {
            self.record_login_failure(user.id);
            Ok(None)
        }
    }

    fn locked_until(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.login_attempts
            .get(&user_id)
            .and_then(|entry| entry.lock().ok().and_then(|g| g.locked_until))
    }

    fn record_login_failure(&self, user_id: Uuid) {
        let entry = self
            .login_attempts
            .entry(user_id)
            .or_insert_with(|| {
                Mutex::new(LoginAttempts {
                    failures: 0,
                    locked_until: None,
                })
            });
        if let Ok(mut guard) = entry.lock() {
            guard.failures += 1;
            if guard.failures >= MAX_LOGIN_ATTEMPTS {
                guard.locked_until = Some(Utc::now() + Duration::minutes(LOCKOUT_DURATION_MINUTES));
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        crate::retry::with_retry(|| async {
            let row = sqlx::query(
                "SELECT id, email, username, password_hash, is_active, is_admin, created_at
                 FROM users WHERE email = ?1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

            row.map(|r| row_to_user(&r)).transpose()
        })
        .await
    }

    /// Create a new cell owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell key cannot be generated uniquely or on
    /// storage failure.
    pub async fn create_cell(&self, owner_id: Uuid, password: &str) -> AppResult<Cell> {
        let password_hash =
            password::hash_password(password).map_err(|e| AppError::invalid_input(e.to_string()))?;
        let id = Uuid::new_v4();
        let key = generate_cell_key();
        let created_at = Utc::now();

        crate::retry::with_retry(|| async {
            let mut tx = self.pool.begin().await.map_err(AppError::from)?;

            sqlx::query(
                "INSERT INTO cells (id, key, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id.to_string())
            .bind(&key)
            .bind(&password_hash)
            .bind(created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

            sqlx::query(
                "INSERT INTO cell_ownerships (user_id, cell_id, permission_level) VALUES (?1, ?2, ?3)",
            )
            .bind(owner_id.to_string())
            .bind(id.to_string())
            .bind(PermissionLevel::Owner.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

            tx.commit().await.map_err(AppError::from)?;
            Ok(())
        })
        .await?;

        Ok(Cell {
            id,
            key,
            password_hash,
            created_at,
        })
    }

    /// List all cells `user_id` has any ownership row for.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn list_cells(&self, user_id: Uuid) -> AppResult<Vec<Cell>> {
        crate::retry::with_retry(|| async {
            let rows = sqlx::query(
                "SELECT c.id, c.key, c.password_hash, c.created_at
                 FROM cells c
                 JOIN cell_ownerships o ON o.cell_id = c.id
                 WHERE o.user_id = ?1",
            )
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

            rows.iter().map(row_to_cell).collect()
        })
        .await
    }

    /// Look up a cell by its external key.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::not_found`] if no such cell exists.
    pub async fn find_cell(&self, cell_key: &str) -> AppResult<Cell> {
        crate::retry::with_retry(|| async {
            let row = sqlx::query("SELECT id, key, password_hash, created_at FROM cells WHERE key = ?1")
                .bind(cell_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| AppError::not_found(format!("cell {cell_key} not found")))?;
            row_to_cell(&row)
        })
        .await
    }

    /// Fetch a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::not_found`] if no such user exists.
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        crate::retry::with_retry(|| async {
            let row = sqlx::query(
                "SELECT id, email, username, password_hash, is_active, is_admin, created_at
                 FROM users WHERE id = ?1",
            )
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::not_found("user not found"))?;
            row_to_user(&row)
        })
        .await
    }

    /// Grant `user_id` the admin flag. Used only by the operator CLI, never
    /// reachable over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::not_found`] if no such user exists.
    pub async fn promote_to_admin(&self, email: &str) -> AppResult<User> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no user registered with email {email}")))?;

        crate::retry::with_retry(|| async {
            sqlx::query("UPDATE users SET is_admin = 1 WHERE id = ?1")
                .bind(user.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(AppError::from)?;
            Ok(())
        })
        .await?;

        Ok(User { is_admin: true, ..user })
    }

    /// Check whether `user_id` has `required` access on `cell_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::forbidden`] if no sufficient ownership row
    /// exists, or a transient error on storage failure.
    pub async fn check_access(
        &self,
        user_id: Uuid,
        cell_id: Uuid,
        required: AccessLevel,
    ) -> AppResult<()> {
        let row = crate::retry::with_retry(|| async {
            sqlx::query(
                "SELECT permission_level FROM cell_ownerships WHERE user_id = ?1 AND cell_id = ?2",
            )
            .bind(user_id.to_string())
            .bind(cell_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)
        })
        .await?;

        let Some(row) = row else {
            return Err(AppError::forbidden("no access to this cell"));
        };

        let level_str: String = row.get("permission_level");
        let level = PermissionLevel::from_str_opt(&level_str)
            .ok_or_else(|| AppError::transient("corrupt permission level in storage"))?;

        match required {
            AccessLevel::Read => Ok(()),
            AccessLevel::Write if level.can_write() => Ok(()),
            AccessLevel::Write => Err(AppError::forbidden("viewer cannot write")),
        }
    }
}

fn generate_cell_key() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> AppResult<User> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| AppError::transient(e.to_string()))?,
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        is_active: row.get::<i64, _>("is_active") != 0,
        is_admin: row.get::<i64, _>("is_admin") != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::transient(e.to_string()))?
            .with_timezone(&Utc),
    })
}

fn row_to_cell(row: &sqlx::sqlite::SqliteRow) -> AppResult<Cell> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(Cell {
        id: Uuid::parse_str(&id).map_err(|e| AppError::transient(e.to_string()))?,
        key: row.get("key"),
        password_hash: row.get("password_hash"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::transient(e.to_string()))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalog() -> Catalog {
        Catalog::connect("sqlite::memory:").await.unwrap_or_else(|e| panic!("{e:?}"))
    }

    #[tokio::test]
    async fn register_then_authenticate_round_trips() {
        let cat = catalog().await;
        cat.register_user("a@x.com", "a", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));
        let user = cat
            .authenticate("a@x.com", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let cat = catalog().await;
        cat.register_user("a@x.com", "a", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));
        let err = cat.register_user("a@x.com", "b", "Abcdefg1").await;
        assert!(matches!(err, Err(e) if e.code == crate::errors::ErrorCode::Conflict));
    }

    #[tokio::test]
    async fn viewer_without_ownership_row_is_forbidden() {
        let cat = catalog().await;
        let owner = cat
            .register_user("o@x.com", "o", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));
        let other = cat
            .register_user("b@x.com", "b", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));
        let cell = cat
            .create_cell(owner.id, "cellpw")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));

        let result = cat.check_access(other.id, cell.id, AccessLevel::Read).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn lockout_blocks_login_after_max_attempts() {
        let cat = catalog().await;
        cat.register_user("a@x.com", "a", "Abcdefg1")
            .await
            .unwrap_or_else(|e| panic!("{e:?}"));

        for _ in 0..MAX_LOGIN_ATTEMPTS {
            let _ = cat.authenticate("a@x.com", "wrong").await;
        }

        let result = cat.authenticate("a@x.com", "Abcdefg1").await;
        assert!(matches!(result, Err(e) if e.code == crate::errors::ErrorCode::RateLimited));
    }
}
