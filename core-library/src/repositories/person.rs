//! Person repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::PersonMetadata;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait PersonRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<PersonMetadata>>;

    async fn find_all(&self) -> Result<Vec<PersonMetadata>>;

    /// Inserts the person or replaces the stored catalog fields.
    ///
    /// Returns `true` when a new row was created.
    async fn upsert(&self, person: &PersonMetadata) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlitePersonRepository {
    pool: SqlitePool,
}

impl SqlitePersonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersonRepository for SqlitePersonRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<PersonMetadata>> {
        let person = query_as::<_, PersonMetadata>("SELECT * FROM people WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(person)
    }

    async fn find_all(&self) -> Result<Vec<PersonMetadata>> {
        let people = query_as::<_, PersonMetadata>("SELECT * FROM people ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(people)
    }

    async fn upsert(&self, person: &PersonMetadata) -> Result<bool> {
        if person.name.trim().is_empty() {
            return Err(LibraryError::invalid("name", "cannot be empty"));
        }

        let existed = self.find_by_id(person.id).await?.is_some();

        query(
            r#"
            INSERT INTO people (
                id, name, popularity, biography, birthday, deathday, place_of_birth,
                profile_path, known_for_department, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                popularity = excluded.popularity,
                biography = excluded.biography,
                birthday = excluded.birthday,
                deathday = excluded.deathday,
                place_of_birth = excluded.place_of_birth,
                profile_path = excluded.profile_path,
                known_for_department = excluded.known_for_department,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(person.id)
        .bind(&person.name)
        .bind(person.popularity)
        .bind(&person.biography)
        .bind(&person.birthday)
        .bind(&person.deathday)
        .bind(&person.place_of_birth)
        .bind(&person.profile_path)
        .bind(&person.known_for_department)
        .bind(person.created_at)
        .bind(person.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(!existed)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = query("DELETE FROM people WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM people")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
