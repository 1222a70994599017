// ABOUTME: Catalog domain types: User, Cell, CellOwnership, and permission levels
// ABOUTME: Mirrors the relations named in SPEC_FULL.md §3
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    /// Primary key.
    pub id: Uuid,
    /// Unique email.
    pub email: String,
    /// Unique username.
    pub username: String,
    /// Argon2id password verifier. The plaintext password is never stored.
    pub password_hash: String,
    /// Whether the account may authenticate.
    pub is_active: bool,
    /// Whether the account has admin-only route access.
    pub is_admin: bool,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

/// Public projection of [`User`] returned over the wire.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// User id.
    pub id: Uuid,
    /// Email.
    pub email: String,
    /// Username.
    pub username: String,
    /// Admin flag.
    pub is_admin: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// An isolated, password-scoped key-value namespace.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Internal primary key.
    pub id: Uuid,
    /// Opaque external identifier used in URLs.
    pub key: String,
    /// Password verifier for the cell, independent of any owner's password.
    pub password_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Public projection of [`Cell`].
#[derive(Debug, Serialize)]
pub struct CellView {
    /// Opaque external identifier.
    pub key: String,
    /// Creation timestamp, RFC3339.
    pub created_at: DateTime<Utc>,
}

impl From<&Cell> for CellView {
    fn from(cell: &Cell) -> Self {
        Self {
            key: cell.key.clone(),
            created_at: cell.created_at,
        }
    }
}

/// Permission level a user holds on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PermissionLevel {
    /// Read-only access.
    Viewer,
    /// Read/write access.
    Editor,
    /// Read/write access plus the ability to manage ownership rows.
    Owner,
}

impl PermissionLevel {
    /// Parse from the string form stored in the database.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Database string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }

    /// Whether this level grants write access (owner or editor).
    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}
