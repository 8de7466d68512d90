//! Embedded asset store
//!
//! SQLite via sqlx with the write-friendly tuning this workload needs:
//! WAL journaling so readers coexist with the single writer, NORMAL
//! synchronous level, and a 5 s busy timeout so contending writers wait
//! instead of failing. The pool holds exactly one connection; writer
//! fan-in is handled upstream by the admission semaphore.

pub mod maintenance;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{AssetMeta, UpsertAction, UpsertResult};

/// Payload and metadata for one stored blob.
pub struct AssetPayload<'a> {
    pub data: &'a [u8],
    pub width: i64,
    pub height: i64,
    pub format: &'a str,
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl Database {
    pub async fn new(path: &str) -> AppResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            path: PathBuf::from(path),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Applies the schema. Idempotent, runs at every startup.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                width INTEGER NOT NULL DEFAULT 0,
                height INTEGER NOT NULL DEFAULT 0,
                format TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aliases (
                key TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_assets_updated_at ON assets(updated_at DESC)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_aliases_asset_id ON aliases(asset_id)")
            .execute(&self.pool)
            .await?;

        info!("database schema ready at {}", self.path.display());
        Ok(())
    }

    pub async fn alias_to_asset_id(&self, key: &str) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT asset_id FROM aliases WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("asset_id")))
    }

    pub async fn read_asset_bytes(&self, id: &str) -> AppResult<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("data")))
    }

    /// Transactional upsert for the upload path.
    ///
    /// The first key is the authority: when it already maps to an asset the
    /// payload replaces that asset in place, otherwise a fresh asset plus
    /// primary alias are created. Secondary keys are attached only when
    /// free or already pointing at the same asset (no stealing). Alias
    /// writes and the asset write commit atomically.
    pub async fn upsert_asset(
        &self,
        keys: &[String],
        payload: AssetPayload<'_>,
    ) -> AppResult<UpsertResult> {
        let primary = keys
            .first()
            .ok_or_else(|| AppError::invalid_parameters("at least one key is required"))?;
        let size = payload.data.len() as i64;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query("SELECT asset_id FROM aliases WHERE key = ?")
                .bind(primary)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("asset_id"));

        let (asset_id, action, old_size) = match existing {
            Some(asset_id) => {
                let old_size: i64 = sqlx::query("SELECT size FROM assets WHERE id = ?")
                    .bind(&asset_id)
                    .fetch_one(&mut *tx)
                    .await?
                    .get("size");

                sqlx::query(
                    "UPDATE assets SET data = ?, width = ?, height = ?, format = ?, size = ?, updated_at = ? WHERE id = ?",
                )
                .bind(payload.data)
                .bind(payload.width)
                .bind(payload.height)
                .bind(payload.format)
                .bind(size)
                .bind(now)
                .bind(&asset_id)
                .execute(&mut *tx)
                .await?;

                (asset_id, UpsertAction::Updated, old_size)
            }
            None => {
                let asset_id = Uuid::new_v4().to_string();

                sqlx::query(
                    "INSERT INTO assets (id, data, width, height, format, size, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&asset_id)
                .bind(payload.data)
                .bind(payload.width)
                .bind(payload.height)
                .bind(payload.format)
                .bind(size)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                sqlx::query("INSERT INTO aliases (key, asset_id, created_at) VALUES (?, ?, ?)")
                    .bind(primary)
                    .bind(&asset_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                (asset_id, UpsertAction::Created, 0)
            }
        };

        let mut assigned_keys = vec![primary.clone()];
        for key in &keys[1..] {
            let owner: Option<String> = sqlx::query("SELECT asset_id FROM aliases WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("asset_id"));

            match owner {
                Some(owner) if owner == asset_id => assigned_keys.push(key.clone()),
                Some(_) => {} // bound elsewhere, never stolen
                None => {
                    sqlx::query(
                        "INSERT INTO aliases (key, asset_id, created_at) VALUES (?, ?, ?)",
                    )
                    .bind(key)
                    .bind(&asset_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    assigned_keys.push(key.clone());
                }
            }
        }

        tx.commit().await?;

        Ok(UpsertResult {
            asset_id,
            action,
            assigned_keys,
            old_size,
        })
    }

    /// Deletes an asset and all of its aliases. Returns the freed size and
    /// the removed keys, or `None` when the id does not exist.
    pub async fn delete_asset(&self, id: &str) -> AppResult<Option<(i64, Vec<String>)>> {
        let mut tx = self.pool.begin().await?;

        let size: Option<i64> = sqlx::query("SELECT size FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("size"));
        let Some(size) = size else {
            return Ok(None);
        };

        let keys: Vec<String> = sqlx::query("SELECT key FROM aliases WHERE asset_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|r| r.get("key"))
            .collect();

        // Children first, then the asset row
        sqlx::query("DELETE FROM aliases WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some((size, keys)))
    }

    /// Replaces the full alias set of an asset.
    pub async fn reassign_aliases(&self, id: &str, keys: &[String]) -> AppResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query("SELECT 1 AS x FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get("x"));
        if exists.is_none() {
            return Err(AppError::not_found("asset", id));
        }

        sqlx::query("DELETE FROM aliases WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for key in keys {
            let owner: Option<String> = sqlx::query("SELECT asset_id FROM aliases WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get("asset_id"));
            if owner.is_some() {
                return Err(AppError::conflict(format!("key '{key}' is already in use")));
            }

            sqlx::query("INSERT INTO aliases (key, asset_id, created_at) VALUES (?, ?, ?)")
                .bind(key)
                .bind(id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(keys.to_vec())
    }

    pub async fn list_recent(&self, limit: u32, offset: u32) -> AppResult<Vec<AssetMeta>> {
        let rows = sqlx::query(
            "SELECT id, width, height, format, size, created_at, updated_at
             FROM assets ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::meta_from_row).collect())
    }

    /// Prefix search over alias keys, newest assets first.
    pub async fn search_by_key_prefix(
        &self,
        prefix: &str,
        limit: u32,
        offset: u32,
    ) -> AppResult<(Vec<AssetMeta>, i64)> {
        let pattern = format!("{}%", prefix.trim_end_matches('%').trim_start_matches('%'));

        let total: i64 = sqlx::query(
            "SELECT COUNT(DISTINCT asset_id) AS n FROM aliases WHERE key LIKE ?",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?
        .get("n");

        let rows = sqlx::query(
            "SELECT DISTINCT a.id, a.width, a.height, a.format, a.size, a.created_at, a.updated_at
             FROM assets a JOIN aliases k ON k.asset_id = a.id
             WHERE k.key LIKE ?
             ORDER BY a.updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Self::meta_from_row).collect(), total))
    }

    pub async fn keys_for_asset(&self, id: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM aliases WHERE asset_id = ? ORDER BY created_at")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("key")).collect())
    }

    /// Oldest assets by `updated_at`, for the prune worker.
    pub async fn oldest_assets(&self, limit: u32) -> AppResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT id, size FROM assets ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("id"), r.get("size")))
            .collect())
    }

    /// Deletes a batch of assets with their aliases in one transaction.
    pub async fn delete_assets(&self, ids: &[String]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let mut tx = self.pool.begin().await?;

        let sql = format!("DELETE FROM aliases WHERE asset_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;

        let sql = format!("DELETE FROM assets WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Σ `asset.size` — the logical payload volume.
    pub async fn logical_size(&self) -> AppResult<i64> {
        let row = sqlx::query("SELECT IFNULL(SUM(size), 0) AS total FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    pub async fn total_count(&self) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Count and byte total in one pass, for startup stats seeding.
    pub async fn initial_stats(&self) -> AppResult<(i64, i64)> {
        let row = sqlx::query("SELECT COUNT(*) AS n, IFNULL(SUM(size), 0) AS total FROM assets")
            .fetch_one(&self.pool)
            .await?;
        Ok((row.get("n"), row.get("total")))
    }

    /// Commits pending WAL frames back into the main file.
    pub async fn checkpoint(&self) -> AppResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rebuilds the database file in place to reclaim free pages. Blocking
    /// for writers, used sparingly by the maintenance worker.
    pub async fn compact(&self) -> AppResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Writes a consistent point-in-time snapshot to `target` without
    /// locking the live database.
    pub async fn snapshot_into(&self, target: &Path) -> AppResult<()> {
        let escaped = target.display().to_string().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{escaped}'"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// On-disk footprint: main file plus the WAL companion.
    pub async fn physical_size(&self) -> AppResult<u64> {
        let mut size = tokio::fs::metadata(&self.path).await?.len();
        let wal = PathBuf::from(format!("{}-wal", self.path.display()));
        if let Ok(meta) = tokio::fs::metadata(&wal).await {
            size += meta.len();
        }
        Ok(size)
    }

    fn meta_from_row(row: sqlx::sqlite::SqliteRow) -> AssetMeta {
        AssetMeta {
            id: row.get("id"),
            width: row.get("width"),
            height: row.get("height"),
            format: row.get("format"),
            size: row.get("size"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        db.migrate().await.unwrap();
        (db, dir)
    }

    fn payload(data: &[u8]) -> AssetPayload<'_> {
        AssetPayload {
            data,
            width: 4,
            height: 4,
            format: "jpeg",
        }
    }

    #[tokio::test]
    async fn create_and_read_round_trip() {
        let (db, _dir) = test_db().await;

        let result = db
            .upsert_asset(&["a".into(), "b".into()], payload(b"hello"))
            .await
            .unwrap();
        assert_eq!(result.action, UpsertAction::Created);
        assert_eq!(result.assigned_keys, vec!["a", "b"]);
        assert_eq!(result.old_size, 0);

        let id = db.alias_to_asset_id("b").await.unwrap().unwrap();
        assert_eq!(id, result.asset_id);
        assert_eq!(db.read_asset_bytes(&id).await.unwrap().unwrap(), b"hello");
        assert_eq!(db.initial_stats().await.unwrap(), (1, 5));
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let (db, _dir) = test_db().await;

        let first = db
            .upsert_asset(&["a".into()], payload(b"one"))
            .await
            .unwrap();
        let second = db
            .upsert_asset(&["a".into()], payload(b"twotwo"))
            .await
            .unwrap();

        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(second.asset_id, first.asset_id);
        assert_eq!(second.old_size, 3);
        assert_eq!(db.total_count().await.unwrap(), 1);
        assert_eq!(
            db.read_asset_bytes(&first.asset_id).await.unwrap().unwrap(),
            b"twotwo"
        );
    }

    #[tokio::test]
    async fn secondary_keys_are_never_stolen() {
        let (db, _dir) = test_db().await;

        let owner = db
            .upsert_asset(&["x".into()], payload(b"first"))
            .await
            .unwrap();
        let second = db
            .upsert_asset(&["y".into(), "x".into()], payload(b"second"))
            .await
            .unwrap();

        assert_eq!(second.action, UpsertAction::Created);
        assert_eq!(second.assigned_keys, vec!["y"]);

        // "x" still resolves to the first asset
        let x_target = db.alias_to_asset_id("x").await.unwrap().unwrap();
        assert_eq!(x_target, owner.asset_id);
    }

    #[tokio::test]
    async fn delete_cascades_aliases() {
        let (db, _dir) = test_db().await;

        let result = db
            .upsert_asset(&["a".into(), "b".into()], payload(b"data"))
            .await
            .unwrap();

        let (size, keys) = db.delete_asset(&result.asset_id).await.unwrap().unwrap();
        assert_eq!(size, 4);
        assert_eq!(keys.len(), 2);

        assert!(db.alias_to_asset_id("a").await.unwrap().is_none());
        assert!(db.alias_to_asset_id("b").await.unwrap().is_none());
        assert!(db.delete_asset(&result.asset_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reassign_rejects_taken_keys() {
        let (db, _dir) = test_db().await;

        let first = db
            .upsert_asset(&["taken".into()], payload(b"a"))
            .await
            .unwrap();
        let second = db
            .upsert_asset(&["mine".into()], payload(b"b"))
            .await
            .unwrap();

        let err = db
            .reassign_aliases(&second.asset_id, &["fresh".into(), "taken".into()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resource/conflict");

        // The failed transaction must not have dropped the old alias set
        assert_eq!(
            db.alias_to_asset_id("mine").await.unwrap().unwrap(),
            second.asset_id
        );
        assert_eq!(
            db.alias_to_asset_id("taken").await.unwrap().unwrap(),
            first.asset_id
        );

        let keys = db
            .reassign_aliases(&second.asset_id, &["fresh".into()])
            .await
            .unwrap();
        assert_eq!(keys, vec!["fresh"]);
        assert!(db.alias_to_asset_id("mine").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oldest_assets_order_by_updated_at() {
        let (db, _dir) = test_db().await;

        let old = db.upsert_asset(&["old".into()], payload(b"1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _mid = db.upsert_asset(&["mid".into()], payload(b"2")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Touching "old" via re-upload moves it to the back of the queue
        db.upsert_asset(&["old".into()], payload(b"1b")).await.unwrap();

        let oldest = db.oldest_assets(1).await.unwrap();
        assert_ne!(oldest[0].0, old.asset_id);
    }

    #[tokio::test]
    async fn batch_delete_and_sizes() {
        let (db, _dir) = test_db().await;

        let a = db.upsert_asset(&["a".into()], payload(b"aaaa")).await.unwrap();
        let b = db.upsert_asset(&["b".into()], payload(b"bb")).await.unwrap();
        assert_eq!(db.logical_size().await.unwrap(), 6);

        db.delete_assets(&[a.asset_id.clone(), b.asset_id.clone()])
            .await
            .unwrap();
        assert_eq!(db.logical_size().await.unwrap(), 0);
        assert!(db.alias_to_asset_id("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefix_search_finds_by_alias() {
        let (db, _dir) = test_db().await;

        db.upsert_asset(&["team/alice".into()], payload(b"1"))
            .await
            .unwrap();
        db.upsert_asset(&["team/bob".into()], payload(b"2"))
            .await
            .unwrap();
        db.upsert_asset(&["other".into()], payload(b"3"))
            .await
            .unwrap();

        let (items, total) = db.search_by_key_prefix("team/", 50, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 2);
    }
}
