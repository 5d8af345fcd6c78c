//! TV show repository trait and implementation
//!
//! Seasons and episodes are stored inside the show row, so a show is always
//! read and written as one snapshot.

use crate::error::{LibraryError, Result};
use crate::models::{RatingStats, TvShowMetadata};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait TvShowRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<TvShowMetadata>>;

    async fn find_all(&self) -> Result<Vec<TvShowMetadata>>;

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<TvShowMetadata>>;

    async fn insert(&self, show: &TvShowMetadata) -> Result<()>;

    /// # Errors
    /// Returns `NotFound` if the show does not exist.
    async fn update(&self, show: &TvShowMetadata) -> Result<()>;

    async fn set_library(&self, id: i64, library_id: Option<&str>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct TvShowRow {
    id: i64,
    library_id: Option<String>,
    name: String,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    year: Option<i32>,
    popularity: f64,
    vote_average: f64,
    vote_count: i64,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    genres: String,
    credits: String,
    seasons: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<TvShowRow> for TvShowMetadata {
    type Error = LibraryError;

    fn try_from(row: TvShowRow) -> Result<Self> {
        Ok(TvShowMetadata {
            id: row.id,
            library_id: row.library_id,
            name: row.name,
            original_name: row.original_name,
            overview: row.overview,
            first_air_date: row.first_air_date,
            year: row.year,
            rating: RatingStats {
                vote_average: row.vote_average,
                vote_count: row.vote_count,
                popularity: row.popularity,
            },
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            genres: serde_json::from_str(&row.genres)?,
            credits: serde_json::from_str(&row.credits)?,
            seasons: serde_json::from_str(&row.seasons)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect_shows(rows: Vec<TvShowRow>) -> Result<Vec<TvShowMetadata>> {
    rows.into_iter().map(TvShowMetadata::try_from).collect()
}

pub struct SqliteTvShowRepository {
    pool: SqlitePool,
}

impl SqliteTvShowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TvShowRepository for SqliteTvShowRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<TvShowMetadata>> {
        query_as::<_, TvShowRow>("SELECT * FROM tv_shows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(TvShowMetadata::try_from)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<TvShowMetadata>> {
        let rows = query_as::<_, TvShowRow>("SELECT * FROM tv_shows ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        collect_shows(rows)
    }

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<TvShowMetadata>> {
        let rows = query_as::<_, TvShowRow>(
            "SELECT * FROM tv_shows WHERE library_id = ? ORDER BY name ASC",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?;
        collect_shows(rows)
    }

    async fn insert(&self, show: &TvShowMetadata) -> Result<()> {
        if show.name.trim().is_empty() {
            return Err(LibraryError::invalid("name", "cannot be empty"));
        }

        query(
            r#"
            INSERT INTO tv_shows (
                id, library_id, name, original_name, overview, first_air_date, year,
                popularity, vote_average, vote_count, poster_path, backdrop_path,
                genres, credits, seasons, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(show.id)
        .bind(&show.library_id)
        .bind(&show.name)
        .bind(&show.original_name)
        .bind(&show.overview)
        .bind(&show.first_air_date)
        .bind(show.year)
        .bind(show.rating.popularity)
        .bind(show.rating.vote_average)
        .bind(show.rating.vote_count)
        .bind(&show.poster_path)
        .bind(&show.backdrop_path)
        .bind(serde_json::to_string(&show.genres)?)
        .bind(serde_json::to_string(&show.credits)?)
        .bind(serde_json::to_string(&show.seasons)?)
        .bind(show.created_at)
        .bind(show.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, show: &TvShowMetadata) -> Result<()> {
        let result = query(
            r#"
            UPDATE tv_shows
            SET library_id = ?, name = ?, original_name = ?, overview = ?, first_air_date = ?,
                year = ?, popularity = ?, vote_average = ?, vote_count = ?, poster_path = ?,
                backdrop_path = ?, genres = ?, credits = ?, seasons = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&show.library_id)
        .bind(&show.name)
        .bind(&show.original_name)
        .bind(&show.overview)
        .bind(&show.first_air_date)
        .bind(show.year)
        .bind(show.rating.popularity)
        .bind(show.rating.vote_average)
        .bind(show.rating.vote_count)
        .bind(&show.poster_path)
        .bind(&show.backdrop_path)
        .bind(serde_json::to_string(&show.genres)?)
        .bind(serde_json::to_string(&show.credits)?)
        .bind(serde_json::to_string(&show.seasons)?)
        .bind(show.updated_at)
        .bind(show.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("TvShow", show.id));
        }

        Ok(())
    }

    async fn set_library(&self, id: i64, library_id: Option<&str>) -> Result<()> {
        let result = query("UPDATE tv_shows SET library_id = ?, updated_at = ? WHERE id = ?")
            .bind(library_id)
            .bind(crate::models::now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("TvShow", id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM tv_shows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM tv_shows")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
