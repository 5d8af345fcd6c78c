//! Domain models for the media catalog
//!
//! Movies, shows and people carry the catalog id as their primary key, so a
//! given catalog entry can exist at most once locally. Libraries, nodes and
//! file records use UUID v4 string ids.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LibraryError;

/// Current time as Unix seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Generates a new UUID v4 string id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Enumerations
// =============================================================================

/// Kind of media a library holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryType {
    Movies,
    TvShows,
}

impl LibraryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Movies => "Movies",
            LibraryType::TvShows => "TvShows",
        }
    }

    /// Media type of the files found in a library of this kind
    pub fn media_type(&self) -> MediaType {
        match self {
            LibraryType::Movies => MediaType::Movie,
            LibraryType::TvShows => MediaType::TvShow,
        }
    }
}

impl FromStr for LibraryType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Movies" => Ok(LibraryType::Movies),
            "TvShows" | "TVShows" => Ok(LibraryType::TvShows),
            other => Err(LibraryError::invalid(
                "library_type",
                format!("unknown library type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entity a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Movie,
    TvShow,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "Movie",
            MediaType::TvShow => "TvShow",
        }
    }
}

impl FromStr for MediaType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Movie" => Ok(MediaType::Movie),
            "TvShow" => Ok(MediaType::TvShow),
            other => Err(LibraryError::invalid(
                "media_type",
                format!("unknown media type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Library
// =============================================================================

/// Configured root directory plus its media kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub id: String,
    pub library_type: LibraryType,
    pub directory_path: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Library {
    pub fn new(
        library_type: LibraryType,
        directory_path: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            library_type,
            directory_path: directory_path.into(),
            title: title.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.title.trim().is_empty() {
            return Err(LibraryError::invalid("title", "cannot be empty"));
        }
        if self.directory_path.trim().is_empty() {
            return Err(LibraryError::invalid("directory_path", "cannot be empty"));
        }
        if !std::path::Path::new(&self.directory_path).is_absolute() {
            return Err(LibraryError::invalid(
                "directory_path",
                format!("'{}' is not an absolute path", self.directory_path),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Credits
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastMember {
    pub person_id: i64,
    pub name: String,
    pub character: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewMember {
    pub person_id: i64,
    pub name: String,
    pub job: Option<String>,
    pub department: Option<String>,
}

/// Cast and crew of a movie, show, season or episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

impl Credits {
    pub fn is_empty(&self) -> bool {
        self.cast.is_empty() && self.crew.is_empty()
    }

    pub fn person_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.cast
            .iter()
            .map(|c| c.person_id)
            .chain(self.crew.iter().map(|c| c.person_id))
    }

    pub fn references(&self, person_id: i64) -> bool {
        self.person_ids().any(|id| id == person_id)
    }
}

/// Audience rating and popularity reported by the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub vote_average: f64,
    pub vote_count: i64,
    pub popularity: f64,
}

// =============================================================================
// Movies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieMetadata {
    /// Catalog id
    pub id: i64,
    /// Library the movie's files live in; cleared when it loses its last file
    pub library_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub year: Option<i32>,
    pub rating: RatingStats,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Vec<String>,
    pub credits: Credits,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MovieMetadata {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id,
            library_id: None,
            title: title.into(),
            original_title: None,
            overview: None,
            release_date: None,
            year: None,
            rating: RatingStats::default(),
            poster_path: None,
            backdrop_path: None,
            genres: Vec::new(),
            credits: Credits::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Every person referenced by the movie's cast and crew
    pub fn person_ids(&self) -> BTreeSet<i64> {
        self.credits.person_ids().collect()
    }

    pub fn references(&self, person_id: i64) -> bool {
        self.credits.references(person_id)
    }

    /// Copies catalog-owned fields from a fresh fetch, keeping local linkage
    /// and the creation time.
    pub fn refreshed_from(&self, fetched: MovieMetadata) -> MovieMetadata {
        MovieMetadata {
            id: self.id,
            library_id: self.library_id.clone(),
            created_at: self.created_at,
            updated_at: now_timestamp(),
            ..fetched
        }
    }
}

// =============================================================================
// TV shows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub season_number: i32,
    pub episode_number: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub still_path: Option<String>,
    #[serde(default)]
    pub rating: RatingStats,
    #[serde(default)]
    pub credits: Credits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub season_number: i32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub credits: Credits,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Season {
    pub fn episode(&self, episode_number: i32) -> Option<&Episode> {
        self.episodes
            .iter()
            .find(|e| e.episode_number == episode_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvShowMetadata {
    /// Catalog id
    pub id: i64,
    pub library_id: Option<String>,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub year: Option<i32>,
    pub rating: RatingStats,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Vec<String>,
    pub credits: Credits,
    pub seasons: Vec<Season>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TvShowMetadata {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id,
            library_id: None,
            name: name.into(),
            original_name: None,
            overview: None,
            first_air_date: None,
            year: None,
            rating: RatingStats::default(),
            poster_path: None,
            backdrop_path: None,
            genres: Vec::new(),
            credits: Credits::default(),
            seasons: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn season(&self, season_number: i32) -> Option<&Season> {
        self.seasons
            .iter()
            .find(|s| s.season_number == season_number)
    }

    fn all_credits(&self) -> impl Iterator<Item = &Credits> + '_ {
        std::iter::once(&self.credits).chain(self.seasons.iter().flat_map(|season| {
            std::iter::once(&season.credits).chain(season.episodes.iter().map(|e| &e.credits))
        }))
    }

    /// Every person referenced by the show, its seasons and its episodes
    pub fn person_ids(&self) -> BTreeSet<i64> {
        self.all_credits()
            .flat_map(|credits| credits.person_ids())
            .collect()
    }

    pub fn references(&self, person_id: i64) -> bool {
        self.all_credits()
            .any(|credits| credits.references(person_id))
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }

    /// Copies catalog-owned fields from a fresh fetch, keeping local linkage
    /// and the creation time.
    pub fn refreshed_from(&self, fetched: TvShowMetadata) -> TvShowMetadata {
        TvShowMetadata {
            id: self.id,
            library_id: self.library_id.clone(),
            created_at: self.created_at,
            updated_at: now_timestamp(),
            ..fetched
        }
    }
}

// =============================================================================
// People
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadata {
    /// Catalog id
    pub id: i64,
    pub name: String,
    pub popularity: f64,
    pub biography: Option<String>,
    pub birthday: Option<String>,
    pub deathday: Option<String>,
    pub place_of_birth: Option<String>,
    pub profile_path: Option<String>,
    pub known_for_department: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PersonMetadata {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id,
            name: name.into(),
            popularity: 0.0,
            biography: None,
            birthday: None,
            deathday: None,
            place_of_birth: None,
            profile_path: None,
            known_for_department: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Files
// =============================================================================

/// A media file known locally (library-owned) or through a peer (node-owned)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub library_id: Option<String>,
    pub node_id: Option<String>,
    pub media_provider_id: i64,
    pub media_type: MediaType,
    pub file_path: String,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub content_hash: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: i64,
}

impl FileMetadata {
    /// New library-owned file record
    pub fn local(
        library_id: impl Into<String>,
        media_type: MediaType,
        media_provider_id: i64,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            library_id: Some(library_id.into()),
            node_id: None,
            media_provider_id,
            media_type,
            file_path: file_path.into(),
            season_number: None,
            episode_number: None,
            content_hash: None,
            file_size: None,
            created_at: now_timestamp(),
        }
    }

    /// New node-owned file record
    pub fn remote(
        node_id: impl Into<String>,
        media_type: MediaType,
        media_provider_id: i64,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            library_id: None,
            node_id: Some(node_id.into()),
            ..Self::local("", media_type, media_provider_id, file_path)
        }
    }

    pub fn with_episode(mut self, season_number: i32, episode_number: i32) -> Self {
        self.season_number = Some(season_number);
        self.episode_number = Some(episode_number);
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_file_size(mut self, size: i64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Identity of the file within its owner, ignoring the record id
    pub fn identity(&self) -> (i64, &str, Option<i32>, Option<i32>) {
        (
            self.media_provider_id,
            self.file_path.as_str(),
            self.season_number,
            self.episode_number,
        )
    }

    pub fn is_local(&self) -> bool {
        self.library_id.is_some()
    }

    pub fn validate(&self) -> Result<(), LibraryError> {
        match (&self.library_id, &self.node_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(LibraryError::invalid(
                    "owner",
                    "exactly one of library_id and node_id must be set",
                ))
            }
        }
        if self.file_path.trim().is_empty() {
            return Err(LibraryError::invalid("file_path", "cannot be empty"));
        }
        if self.media_type == MediaType::Movie
            && (self.season_number.is_some() || self.episode_number.is_some())
        {
            return Err(LibraryError::invalid(
                "episode_number",
                "movie files cannot carry season or episode numbers",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A trusted peer
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Key presented when calling this peer
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub is_enabled: bool,
    pub last_validated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, url: impl Into<String>, api_key: Option<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            name: name.into(),
            url: url.into(),
            api_key,
            is_enabled: true,
            last_validated_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("is_enabled", &self.is_enabled)
            .field("last_validated_at", &self.last_validated_at)
            .finish()
    }
}
