//! Library repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Library, LibraryType};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Library>>;

    /// All libraries ordered by title
    async fn find_all(&self) -> Result<Vec<Library>>;

    /// # Errors
    /// Returns `InvalidInput` if validation fails.
    async fn insert(&self, library: &Library) -> Result<()>;

    /// # Errors
    /// Returns `NotFound` if the library does not exist.
    async fn update(&self, library: &Library) -> Result<()>;

    /// Deletes the library. Its file rows cascade; movies and shows linked
    /// to it lose their library linkage.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(FromRow)]
struct LibraryRow {
    id: String,
    library_type: String,
    directory_path: String,
    title: String,
    description: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<LibraryRow> for Library {
    type Error = LibraryError;

    fn try_from(row: LibraryRow) -> Result<Self> {
        Ok(Library {
            id: row.id,
            library_type: row.library_type.parse::<LibraryType>()?,
            directory_path: row.directory_path,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Library>> {
        query_as::<_, LibraryRow>("SELECT * FROM libraries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Library::try_from)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<Library>> {
        query_as::<_, LibraryRow>("SELECT * FROM libraries ORDER BY title ASC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Library::try_from)
            .collect()
    }

    async fn insert(&self, library: &Library) -> Result<()> {
        library.validate()?;

        query(
            r#"
            INSERT INTO libraries (
                id, library_type, directory_path, title, description, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&library.id)
        .bind(library.library_type.as_str())
        .bind(&library.directory_path)
        .bind(&library.title)
        .bind(&library.description)
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, library: &Library) -> Result<()> {
        library.validate()?;

        let result = query(
            r#"
            UPDATE libraries
            SET library_type = ?, directory_path = ?, title = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(library.library_type.as_str())
        .bind(&library.directory_path)
        .bind(&library.title)
        .bind(&library.description)
        .bind(library.updated_at)
        .bind(&library.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Library", &library.id));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM libraries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
