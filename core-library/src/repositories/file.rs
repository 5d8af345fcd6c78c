//! File record repository trait and implementation
//!
//! The unique index on `(owner, media_provider_id, file_path, season, episode)`
//! makes `insert` idempotent: a second insert of the same identity is ignored
//! and reported as `false`.

use crate::error::{LibraryError, Result};
use crate::models::{FileMetadata, MediaType};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<FileMetadata>>;

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<FileMetadata>>;

    async fn find_by_node(&self, node_id: &str) -> Result<Vec<FileMetadata>>;

    /// Node-owned record for a remote path, if the node's catalog was fetched
    async fn find_by_node_path(&self, node_id: &str, file_path: &str)
        -> Result<Option<FileMetadata>>;

    /// Every library-owned record
    async fn find_local(&self) -> Result<Vec<FileMetadata>>;

    /// Library-owned records linked to one catalog entry
    async fn find_local_for_media(
        &self,
        media_type: MediaType,
        media_provider_id: i64,
    ) -> Result<Vec<FileMetadata>>;

    /// Inserts unless a record with the same owner and identity exists.
    ///
    /// Returns `true` when a row was written.
    async fn insert(&self, file: &FileMetadata) -> Result<bool>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Removes every library-owned record of a catalog entry.
    async fn delete_local_for_media(
        &self,
        media_type: MediaType,
        media_provider_id: i64,
    ) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct FileRow {
    id: String,
    library_id: Option<String>,
    node_id: Option<String>,
    media_provider_id: i64,
    media_type: String,
    file_path: String,
    season_number: Option<i32>,
    episode_number: Option<i32>,
    content_hash: Option<String>,
    file_size: Option<i64>,
    created_at: i64,
}

impl TryFrom<FileRow> for FileMetadata {
    type Error = LibraryError;

    fn try_from(row: FileRow) -> Result<Self> {
        Ok(FileMetadata {
            id: row.id,
            library_id: row.library_id,
            node_id: row.node_id,
            media_provider_id: row.media_provider_id,
            media_type: row.media_type.parse()?,
            file_path: row.file_path,
            season_number: row.season_number,
            episode_number: row.episode_number,
            content_hash: row.content_hash,
            file_size: row.file_size,
            created_at: row.created_at,
        })
    }
}

fn collect_files(rows: Vec<FileRow>) -> Result<Vec<FileMetadata>> {
    rows.into_iter().map(FileMetadata::try_from).collect()
}

pub struct SqliteFileRepository {
    pool: SqlitePool,
}

impl SqliteFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for SqliteFileRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<FileMetadata>> {
        query_as::<_, FileRow>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(FileMetadata::try_from)
            .transpose()
    }

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<FileMetadata>> {
        let rows = query_as::<_, FileRow>(
            "SELECT * FROM files WHERE library_id = ? ORDER BY file_path ASC",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?;
        collect_files(rows)
    }

    async fn find_by_node(&self, node_id: &str) -> Result<Vec<FileMetadata>> {
        let rows =
            query_as::<_, FileRow>("SELECT * FROM files WHERE node_id = ? ORDER BY file_path ASC")
                .bind(node_id)
                .fetch_all(&self.pool)
                .await?;
        collect_files(rows)
    }

    async fn find_by_node_path(
        &self,
        node_id: &str,
        file_path: &str,
    ) -> Result<Option<FileMetadata>> {
        query_as::<_, FileRow>(
            "SELECT * FROM files WHERE node_id = ? AND file_path = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(node_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?
        .map(FileMetadata::try_from)
        .transpose()
    }

    async fn find_local(&self) -> Result<Vec<FileMetadata>> {
        let rows = query_as::<_, FileRow>(
            "SELECT * FROM files WHERE library_id IS NOT NULL ORDER BY file_path ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        collect_files(rows)
    }

    async fn find_local_for_media(
        &self,
        media_type: MediaType,
        media_provider_id: i64,
    ) -> Result<Vec<FileMetadata>> {
        let rows = query_as::<_, FileRow>(
            r#"
            SELECT * FROM files
            WHERE library_id IS NOT NULL AND media_type = ? AND media_provider_id = ?
            ORDER BY file_path ASC
            "#,
        )
        .bind(media_type.as_str())
        .bind(media_provider_id)
        .fetch_all(&self.pool)
        .await?;
        collect_files(rows)
    }

    async fn insert(&self, file: &FileMetadata) -> Result<bool> {
        file.validate()?;

        let result = query(
            r#"
            INSERT OR IGNORE INTO files (
                id, library_id, node_id, media_provider_id, media_type, file_path,
                season_number, episode_number, content_hash, file_size, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.library_id)
        .bind(&file.node_id)
        .bind(file.media_provider_id)
        .bind(file.media_type.as_str())
        .bind(&file.file_path)
        .bind(file.season_number)
        .bind(file.episode_number)
        .bind(&file.content_hash)
        .bind(file.file_size)
        .bind(file.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_local_for_media(
        &self,
        media_type: MediaType,
        media_provider_id: i64,
    ) -> Result<u64> {
        let result = query(
            "DELETE FROM files WHERE library_id IS NOT NULL AND media_type = ? AND media_provider_id = ?",
        )
        .bind(media_type.as_str())
        .bind(media_provider_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
