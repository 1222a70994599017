// ABOUTME: Per-cell isolated key-value storage backed by one SQLite file per cell
// ABOUTME: Pooled connections keyed by cell_key, grounded on the teacher's DatabaseProvider pool idiom
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::errors::{AppError, AppResult};

/// A single stored row: the raw value (as written by `CryptoCore::encrypt`
/// when encryption is enabled, or plaintext otherwise) plus metadata.
#[derive(Debug, Clone)]
pub struct CellItem {
    /// Item key.
    pub key: String,
    /// Stored value (JSON envelope or plaintext, per `crypto_enabled`).
    pub value: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-write timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Per-cell storage, backed by one SQLite file per `cell_key` under
/// `cells_dir`. Connections are pooled and cached lazily per cell.
pub struct CellStore {
    cells_dir: PathBuf,
    pools: DashMap<String, Arc<SqlitePool>>,
}

impl CellStore {
    /// Create a new store rooted at `cells_dir`.
    #[must_use]
    pub fn new(cells_dir: PathBuf) -> Self {
        Self {
            cells_dir,
            pools: DashMap::new(),
        }
    }

    fn cell_path(&self, cell_key: &str) -> PathBuf {
        self.cells_dir.join(cell_key).join("data.db")
    }

    async fn pool_for(&self, cell_key: &str) -> AppResult<Arc<SqlitePool>> {
        if let Some(pool) = self.pools.get(cell_key) {
            return Ok(Arc::clone(&pool));
        }

        let path = self.cell_path(cell_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::transient(e.to_string()))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(AppError::from)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS data (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(AppError::from)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .map_err(AppError::from)?;

        let pool = Arc::new(pool);
        self.pools.insert(cell_key.to_owned(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Upsert `(item_key, value)` in `cell_key`. Sets `created_at` on
    /// insert, `updated_at` on every write.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or the write fails.
    pub async fn put(&self, cell_key: &str, item_key: &str, value: &str) -> AppResult<()> {
        crate::retry::with_retry(|| async {
            let pool = self.pool_for(cell_key).await?;
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO data (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(item_key)
            .bind(value)
            .bind(&now)
            .execute(&*pool)
            .await
            .map_err(AppError::from)?;
            Ok(())
        })
        .await
    }

    /// Fetch `item_key` from `cell_key`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::not_found`] if the item does not exist.
    pub async fn get(&self, cell_key: &str, item_key: &str) -> AppResult<CellItem> {
        crate::retry::with_retry(|| async {
            let pool = self.pool_for(cell_key).await?;
            let row = sqlx::query("SELECT key, value, created_at, updated_at FROM data WHERE key = ?1")
                .bind(item_key)
                .fetch_optional(&*pool)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| AppError::not_found(format!("item {item_key} not found")))?;

            row_to_item(&row)
        })
        .await
    }

    /// Delete `item_key` from `cell_key`. A no-op if the row is absent —
    /// never errors on missing row.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying pool/query fails.
    pub async fn delete(&self, cell_key: &str, item_key: &str) -> AppResult<()> {
        crate::retry::with_retry(|| async {
            let pool = self.pool_for(cell_key).await?;
            sqlx::query("DELETE FROM data WHERE key = ?1")
                .bind(item_key)
                .execute(&*pool)
                .await
                .map_err(AppError::from)?;
            Ok(())
        })
        .await
    }

    /// List all item keys in `cell_key`, in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or the query fails.
    pub async fn list_keys(&self, cell_key: &str) -> AppResult<Vec<String>> {
        crate::retry::with_retry(|| async {
            let pool = self.pool_for(cell_key).await?;
            let rows = sqlx::query("SELECT key FROM data")
                .fetch_all(&*pool)
                .await
                .map_err(AppError::from)?;
            Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
        })
        .await
    }

    /// Fetch every row in `cell_key` with its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or the query fails.
    pub async fn scan(&self, cell_key: &str) -> AppResult<Vec<CellItem>> {
        crate::retry::with_retry(|| async {
            let pool = self.pool_for(cell_key).await?;
            let rows = sqlx::query("SELECT key, value, created_at, updated_at FROM data")
                .fetch_all(&*pool)
                .await
                .map_err(AppError::from)?;
            rows.iter().map(row_to_item).collect()
        })
        .await
    }

    /// Delete a cell's entire backing file. Per the Open Question decision
    /// in `DESIGN.md`, deletion removes the file outright (no residue).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete_cell(&self, cell_key: &str) -> AppResult<()> {
        self.pools.remove(cell_key);
        let path = self.cell_path(cell_key);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| AppError::transient(e.to_string()))?;
        }
        Ok(())
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> AppResult<CellItem> {
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(CellItem {
        key: row.get("key"),
        value: row.get("value"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::transient(e.to_string()))?
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| AppError::transient(e.to_string()))?
            .with_timezone(&Utc),
    })
}

/// Resolve the base directory for a brand-new `CellStore`, creating it if
/// necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub async fn ensure_cells_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = CellStore::new(dir.path().to_path_buf());
        store.put("cellA", "k", "v1").await.unwrap_or_else(|e| panic!("{e:?}"));
        let item = store.get("cellA", "k").await.unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(item.value, "v1");
    }

    #[tokio::test]
    async fn second_put_updates_value_and_updated_at() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = CellStore::new(dir.path().to_path_buf());
        store.put("cellA", "k", "v1").await.unwrap_or_else(|e| panic!("{e:?}"));
        store.put("cellA", "k", "v2").await.unwrap_or_else(|e| panic!("{e:?}"));
        let item = store.get("cellA", "k").await.unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(item.value, "v2");
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_get_then_404s() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = CellStore::new(dir.path().to_path_buf());
        store.put("cellA", "k", "v1").await.unwrap_or_else(|e| panic!("{e:?}"));
        store.delete("cellA", "k").await.unwrap_or_else(|e| panic!("{e:?}"));
        store.delete("cellA", "k").await.unwrap_or_else(|e| panic!("{e:?}"));
        assert!(store.get("cellA", "k").await.is_err());
    }

    #[tokio::test]
    async fn cells_are_isolated_from_each_other() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = CellStore::new(dir.path().to_path_buf());
        store.put("cellA", "k", "a").await.unwrap_or_else(|e| panic!("{e:?}"));
        store.put("cellB", "k", "b").await.unwrap_or_else(|e| panic!("{e:?}"));
        assert_eq!(store.get("cellA", "k").await.unwrap_or_else(|e| panic!("{e:?}")).value, "a");
        assert_eq!(store.get("cellB", "k").await.unwrap_or_else(|e| panic!("{e:?}")).value, "b");
    }
}
