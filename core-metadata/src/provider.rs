//! Catalog provider abstraction
//!
//! The synchronizer talks to the external catalog only through
//! [`MetadataProvider`], so tests can swap in a scripted fake.

use crate::error::Result;
use async_trait::async_trait;
use core_library::models::{Episode, MovieMetadata, PersonMetadata, Season, TvShowMetadata};
use serde::{Deserialize, Serialize};

/// One hit of a title search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Catalog id
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub popularity: f64,
}

/// Read access to the external metadata catalog.
///
/// Detail calls return local model types with catalog-owned fields filled
/// in; `library_id` is always `None` and timestamps are the fetch time.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search movies by title, optionally restricted to a release year
    async fn search_movie(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchResult>>;

    /// Movie details including cast and crew
    async fn get_movie(&self, id: i64) -> Result<MovieMetadata>;

    /// Search shows by title, optionally restricted to a first-air year
    async fn search_tv(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchResult>>;

    /// Show details with show-level credits.
    ///
    /// Seasons are listed without episodes; fetch them with
    /// [`get_season`](Self::get_season).
    async fn get_tv(&self, id: i64) -> Result<TvShowMetadata>;

    /// Season details with its episode list
    async fn get_season(&self, show_id: i64, season_number: i32) -> Result<Season>;

    /// Episode details with guest cast and crew
    async fn get_episode(
        &self,
        show_id: i64,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Episode>;

    async fn get_person(&self, id: i64) -> Result<PersonMetadata>;
}
