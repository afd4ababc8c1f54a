//! SQLite implementation of [`FaceStore`]
//!
//! The `faces` table layout is shared with earlier face index databases, so an existing
//! `photo_face_index.db` opens and searches without migration. Embeddings are stored as
//! 1024-byte blobs of native-endian `f64`s, bounding boxes as `"top,right,bottom,left"`.

use super::{
    FaceRecord, FaceStore, IndexedFile, IndexedSnapshot, ProcessedFile, StoreStats, StoredFace,
    path_key,
};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use face_finder_embed::{BoundingBox, FaceEmbedding};
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SqliteFaceStore {
    pool: SqlitePool,
}

impl SqliteFaceStore {
    /// Open the store at `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(Self::connect_options(path).create_if_missing(true))
            .await
            .with_context(|| format!("Failed to connect to database {}", path.display()))?;
        info!("Opened face index at {}", path.display());
        Self::new_with_pool(pool).await
    }

    /// Open a store that must already exist. A missing file is a [`ConfigError::StoreNotFound`].
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::StoreNotFound(path.to_path_buf()).into());
        }
        let pool = SqlitePool::connect_with(Self::connect_options(path).create_if_missing(false))
            .await
            .with_context(|| format!("Failed to connect to database {}", path.display()))?;
        Self::new_with_pool(pool).await
    }

    /// Opens an in-memory store for testing.
    pub async fn open_memory() -> Result<Self> {
        // Each connection to :memory: is a separate database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    fn connect_options(path: &Path) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// Idempotent schema setup
    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS faces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                last_modified REAL NOT NULL,
                face_encoding BLOB NOT NULL,
                face_location_css TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_path ON faces (file_path)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scanned_files (
                file_path TEXT PRIMARY KEY,
                last_modified REAL NOT NULL,
                face_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FaceStore for SqliteFaceStore {
    async fn snapshot(&self) -> Result<IndexedSnapshot> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, MAX(last_modified) AS last_modified FROM (
                SELECT file_path, last_modified FROM faces
                UNION ALL
                SELECT file_path, last_modified FROM scanned_files
            )
            GROUP BY file_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = IndexedSnapshot::with_capacity(rows.len());
        for row in rows {
            let file_path: String = row.try_get("file_path")?;
            let last_modified: f64 = row.try_get("last_modified")?;
            snapshot.insert(PathBuf::from(file_path), last_modified);
        }
        Ok(snapshot)
    }

    async fn replace_file_faces(
        &self,
        path: &Path,
        outcome: Option<&ProcessedFile>,
    ) -> Result<usize> {
        let key = path_key(path);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM faces WHERE file_path = ?1")
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scanned_files WHERE file_path = ?1")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        if let Some(processed) = outcome {
            for face in &processed.faces {
                sqlx::query(
                    r#"
                    INSERT INTO faces (file_path, last_modified, face_encoding, face_location_css)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                )
                .bind(&key)
                .bind(processed.last_modified)
                .bind(face.embedding.to_bytes())
                .bind(face.bounding_box.to_string())
                .execute(&mut *tx)
                .await?;
                inserted += 1;
            }

            sqlx::query(
                "INSERT INTO scanned_files (file_path, last_modified, face_count) VALUES (?1, ?2, ?3)",
            )
            .bind(&key)
            .bind(processed.last_modified)
            .bind(inserted as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Replaced rows for {} with {} face(s)", key, inserted);
        Ok(inserted)
    }

    async fn load_embeddings(&self) -> Result<Vec<StoredFace>> {
        let rows = sqlx::query("SELECT file_path, face_encoding FROM faces ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let file_path: String = row.try_get("file_path")?;
                let encoding: Vec<u8> = row.try_get("face_encoding")?;
                Ok(StoredFace {
                    file_path: PathBuf::from(file_path),
                    encoding,
                })
            })
            .collect()
    }

    async fn face_records(&self, path: &Path) -> Result<Vec<FaceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, last_modified, face_encoding, face_location_css
            FROM faces WHERE file_path = ?1 ORDER BY id
            "#,
        )
        .bind(path_key(path))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let file_path: String = row.try_get("file_path")?;
            let last_modified: f64 = row.try_get("last_modified")?;
            let encoding: Vec<u8> = row.try_get("face_encoding")?;
            let location: Option<String> = row.try_get("face_location_css")?;

            let bounding_box = location
                .map(|css| css.parse::<BoundingBox>())
                .transpose()
                .map_err(anyhow::Error::msg)?;

            records.push(FaceRecord {
                file_path: PathBuf::from(file_path),
                last_modified,
                embedding: FaceEmbedding::from_bytes(&encoding)?,
                bounding_box,
            });
        }
        Ok(records)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let face_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM faces")
            .fetch_one(&self.pool)
            .await?;
        let files_with_faces: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT file_path) FROM faces")
            .fetch_one(&self.pool)
            .await?;
        let files_without_faces: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scanned_files WHERE face_count = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            face_rows: face_rows as usize,
            files_with_faces: files_with_faces as usize,
            files_without_faces: files_without_faces as usize,
        })
    }

    async fn list_files(&self, limit: usize) -> Result<Vec<IndexedFile>> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, COUNT(*) AS face_count, MAX(last_modified) AS last_modified
            FROM faces GROUP BY file_path
            UNION ALL
            SELECT file_path, face_count, last_modified
            FROM scanned_files
            WHERE face_count = 0 AND file_path NOT IN (SELECT file_path FROM faces)
            ORDER BY file_path
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let file_path: String = row.try_get("file_path")?;
            let face_count: i64 = row.try_get("face_count")?;
            let last_modified: f64 = row.try_get("last_modified")?;
            files.push(IndexedFile {
                file_path: PathBuf::from(file_path),
                face_count: face_count as usize,
                last_modified,
            });
        }
        Ok(files)
    }
}
