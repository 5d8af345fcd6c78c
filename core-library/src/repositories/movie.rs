//! Movie repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Credits, MovieMetadata, RatingStats};
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait MovieRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<MovieMetadata>>;

    async fn find_all(&self) -> Result<Vec<MovieMetadata>>;

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<MovieMetadata>>;

    /// # Errors
    /// Fails if a movie with the same catalog id exists.
    async fn insert(&self, movie: &MovieMetadata) -> Result<()>;

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    /// Returns `NotFound` if the movie does not exist.
    async fn update(&self, movie: &MovieMetadata) -> Result<()>;

    /// Links the movie to a library, or clears the link with `None`.
    async fn set_library(&self, id: i64, library_id: Option<&str>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

#[derive(FromRow)]
struct MovieRow {
    id: i64,
    library_id: Option<String>,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    year: Option<i32>,
    popularity: f64,
    vote_average: f64,
    vote_count: i64,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    genres: String,
    credits: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MovieRow> for MovieMetadata {
    type Error = LibraryError;

    fn try_from(row: MovieRow) -> Result<Self> {
        Ok(MovieMetadata {
            id: row.id,
            library_id: row.library_id,
            title: row.title,
            original_title: row.original_title,
            overview: row.overview,
            release_date: row.release_date,
            year: row.year,
            rating: RatingStats {
                vote_average: row.vote_average,
                vote_count: row.vote_count,
                popularity: row.popularity,
            },
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            genres: serde_json::from_str(&row.genres)?,
            credits: serde_json::from_str::<Credits>(&row.credits)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct SqliteMovieRepository {
    pool: SqlitePool,
}

impl SqliteMovieRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, bind: Option<&str>) -> Result<Vec<MovieMetadata>> {
        let mut q = query_as::<_, MovieRow>(sql);
        if let Some(value) = bind {
            q = q.bind(value);
        }
        q.fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(MovieMetadata::try_from)
            .collect()
    }
}

#[async_trait]
impl MovieRepository for SqliteMovieRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<MovieMetadata>> {
        query_as::<_, MovieRow>("SELECT * FROM movies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(MovieMetadata::try_from)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<MovieMetadata>> {
        self.fetch_many("SELECT * FROM movies ORDER BY title ASC", None)
            .await
    }

    async fn find_by_library(&self, library_id: &str) -> Result<Vec<MovieMetadata>> {
        self.fetch_many(
            "SELECT * FROM movies WHERE library_id = ? ORDER BY title ASC",
            Some(library_id),
        )
        .await
    }

    async fn insert(&self, movie: &MovieMetadata) -> Result<()> {
        if movie.title.trim().is_empty() {
            return Err(LibraryError::invalid("title", "cannot be empty"));
        }

        query(
            r#"
            INSERT INTO movies (
                id, library_id, title, original_title, overview, release_date, year,
                popularity, vote_average, vote_count, poster_path, backdrop_path,
                genres, credits, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(movie.id)
        .bind(&movie.library_id)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.overview)
        .bind(&movie.release_date)
        .bind(movie.year)
        .bind(movie.rating.popularity)
        .bind(movie.rating.vote_average)
        .bind(movie.rating.vote_count)
        .bind(&movie.poster_path)
        .bind(&movie.backdrop_path)
        .bind(serde_json::to_string(&movie.genres)?)
        .bind(serde_json::to_string(&movie.credits)?)
        .bind(movie.created_at)
        .bind(movie.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, movie: &MovieMetadata) -> Result<()> {
        let result = query(
            r#"
            UPDATE movies
            SET library_id = ?, title = ?, original_title = ?, overview = ?, release_date = ?,
                year = ?, popularity = ?, vote_average = ?, vote_count = ?, poster_path = ?,
                backdrop_path = ?, genres = ?, credits = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&movie.library_id)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.overview)
        .bind(&movie.release_date)
        .bind(movie.year)
        .bind(movie.rating.popularity)
        .bind(movie.rating.vote_average)
        .bind(movie.rating.vote_count)
        .bind(&movie.poster_path)
        .bind(&movie.backdrop_path)
        .bind(serde_json::to_string(&movie.genres)?)
        .bind(serde_json::to_string(&movie.credits)?)
        .bind(movie.updated_at)
        .bind(movie.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Movie", movie.id));
        }

        Ok(())
    }

    async fn set_library(&self, id: i64, library_id: Option<&str>) -> Result<()> {
        let result = query("UPDATE movies SET library_id = ?, updated_at = ? WHERE id = ?")
            .bind(library_id)
            .bind(crate::models::now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Movie", id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{CastMember, Library, LibraryType};
    use crate::repositories::{LibraryRepository, SqliteLibraryRepository};

    fn sample_movie() -> MovieMetadata {
        let mut movie = MovieMetadata::new(603, "The Matrix");
        movie.year = Some(1999);
        movie.genres = vec!["Action".to_string(), "Science Fiction".to_string()];
        movie.credits.cast.push(CastMember {
            person_id: 6384,
            name: "Keanu Reeves".to_string(),
            character: Some("Neo".to_string()),
            order: Some(0),
        });
        movie
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrips_nested_fields() {
        let repo = SqliteMovieRepository::new(create_test_pool().await.unwrap());
        let movie = sample_movie();

        repo.insert(&movie).await.unwrap();
        let found = repo.find_by_id(603).await.unwrap().unwrap();

        assert_eq!(found, movie);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_catalog_id_rejected() {
        let repo = SqliteMovieRepository::new(create_test_pool().await.unwrap());
        repo.insert(&sample_movie()).await.unwrap();

        assert!(repo.insert(&sample_movie()).await.is_err());
    }

    #[tokio::test]
    async fn test_library_link_and_cascade() {
        let pool = create_test_pool().await.unwrap();
        let libraries = SqliteLibraryRepository::new(pool.clone());
        let repo = SqliteMovieRepository::new(pool);

        let library = Library::new(LibraryType::Movies, "/srv/movies", "Movies");
        libraries.insert(&library).await.unwrap();
        repo.insert(&sample_movie()).await.unwrap();

        repo.set_library(603, Some(&library.id)).await.unwrap();
        assert_eq!(repo.find_by_library(&library.id).await.unwrap().len(), 1);

        libraries.delete(&library.id).await.unwrap();
        let movie = repo.find_by_id(603).await.unwrap().unwrap();
        assert!(movie.library_id.is_none(), "linkage cleared with the library");
    }

    #[tokio::test]
    async fn test_update_missing_movie() {
        let repo = SqliteMovieRepository::new(create_test_pool().await.unwrap());
        let err = repo.update(&sample_movie()).await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }
}
