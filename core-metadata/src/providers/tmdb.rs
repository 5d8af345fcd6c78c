//! TMDB API Client
//!
//! [`MetadataProvider`] implementation for The Movie Database v3 API.
//!
//! ## API Endpoints
//!
//! - `GET /search/movie?query=&year=`
//! - `GET /movie/{id}?append_to_response=credits`
//! - `GET /search/tv?query=&first_air_date_year=`
//! - `GET /tv/{id}?append_to_response=credits`
//! - `GET /tv/{id}/season/{n}?append_to_response=credits`
//! - `GET /tv/{id}/season/{n}/episode/{e}`
//! - `GET /person/{id}`
//!
//! ## Authentication
//!
//! Requests carry the configured API read token as a bearer token. A `401`
//! response maps to [`MetadataError::InvalidApiKey`], which callers treat as
//! fatal.
//!
//! ## Rate Limiting
//!
//! A minimum delay between requests is enforced client-side
//! (`MetadataApiConfig::rate_limit_delay_ms`). `429` and `5xx` responses are
//! retried by the HTTP client with exponential backoff.

use crate::error::{MetadataError, Result};
use crate::provider::{MetadataProvider, SearchResult};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use core_library::models::{
    CastMember, Credits, CrewMember, Episode, MovieMetadata, PersonMetadata, RatingStats, Season,
    TvShowMetadata,
};
use core_runtime::config::MetadataApiConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "TMDB";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Enforces a minimum delay between consecutive requests
struct RateLimiter {
    clock: Arc<dyn Clock>,
    last_request_ms: Option<i64>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(delay_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_request_ms: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request_ms {
            let elapsed_ms = self.clock.unix_timestamp_millis() - last;
            let required_ms = self.min_delay.as_millis() as i64;
            if elapsed_ms < required_ms {
                let wait = Duration::from_millis((required_ms - elapsed_ms) as u64);
                debug!(wait_ms = wait.as_millis() as u64, "Catalog rate limit");
                sleep(wait).await;
            }
        }
        self.last_request_ms = Some(self.clock.unix_timestamp_millis());
    }
}

pub struct TmdbClient {
    http_client: Arc<dyn HttpClient>,
    config: MetadataApiConfig,
    retry_policy: RetryPolicy,
    rate_limiter: Mutex<RateLimiter>,
}

impl TmdbClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: MetadataApiConfig) -> Self {
        Self::with_clock(http_client, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        http_client: Arc<dyn HttpClient>,
        config: MetadataApiConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_delay_ms, clock);
        Self {
            http_client,
            config,
            retry_policy: RetryPolicy::default(),
            rate_limiter: Mutex::new(rate_limiter),
        }
    }

    /// Overrides the retry policy used for catalog requests
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn build_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}{}?language={}",
            self.config.base_url,
            path,
            urlencoding::encode(&self.config.language)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(MetadataError::MissingApiKey)?;

        let url = self.build_url(path, params);
        self.rate_limiter.lock().await.wait_if_needed().await;

        debug!(path, "Catalog request");
        let request = HttpRequest::get(url)
            .bearer_token(api_key)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| {
                if e.is_connectivity() {
                    MetadataError::NetworkError(format!("{} {}: {}", PROVIDER_NAME, path, e))
                } else {
                    MetadataError::Bridge(e)
                }
            })?;

        match response.status {
            status if (200..300).contains(&status) => serde_json::from_slice(&response.body)
                .map_err(|e| MetadataError::JsonParse(format!("{}: {}", path, e))),
            401 => Err(MetadataError::InvalidApiKey {
                status: response.status,
            }),
            404 => Err(MetadataError::NotFound(path.to_string())),
            429 => {
                let retry_after = response
                    .headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
                    .and_then(|(_, v)| v.parse::<u64>().ok())
                    .unwrap_or(10);
                warn!(path, retry_after, "Catalog rate limit exceeded");
                Err(MetadataError::RateLimited {
                    provider: PROVIDER_NAME.to_string(),
                    retry_after_seconds: retry_after,
                })
            }
            status => Err(MetadataError::HttpError {
                status,
                body: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect(),
            }),
        }
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_movie(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchResult>> {
        let mut params = vec![
            ("query", title.to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }

        let page: SearchPage<MovieHit> = self.get_json("/search/movie", &params).await?;
        Ok(page.results.into_iter().map(SearchResult::from).collect())
    }

    async fn get_movie(&self, id: i64) -> Result<MovieMetadata> {
        let details: MovieDetails = self
            .get_json(
                &format!("/movie/{}", id),
                &[("append_to_response", "credits".to_string())],
            )
            .await?;
        Ok(details.into())
    }

    async fn search_tv(&self, title: &str, year: Option<i32>) -> Result<Vec<SearchResult>> {
        let mut params = vec![
            ("query", title.to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            params.push(("first_air_date_year", year.to_string()));
        }

        let page: SearchPage<TvHit> = self.get_json("/search/tv", &params).await?;
        Ok(page.results.into_iter().map(SearchResult::from).collect())
    }

    async fn get_tv(&self, id: i64) -> Result<TvShowMetadata> {
        let details: TvDetails = self
            .get_json(
                &format!("/tv/{}", id),
                &[("append_to_response", "credits".to_string())],
            )
            .await?;
        Ok(details.into())
    }

    async fn get_season(&self, show_id: i64, season_number: i32) -> Result<Season> {
        let details: SeasonDetails = self
            .get_json(
                &format!("/tv/{}/season/{}", show_id, season_number),
                &[("append_to_response", "credits".to_string())],
            )
            .await?;
        Ok(details.into())
    }

    async fn get_episode(
        &self,
        show_id: i64,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Episode> {
        let details: EpisodeDetails = self
            .get_json(
                &format!(
                    "/tv/{}/season/{}/episode/{}",
                    show_id, season_number, episode_number
                ),
                &[],
            )
            .await?;
        Ok(details.into())
    }

    async fn get_person(&self, id: i64) -> Result<PersonMetadata> {
        let details: PersonDetails = self.get_json(&format!("/person/{}", id), &[]).await?;
        Ok(details.into())
    }
}

// =============================================================================
// Wire types
// =============================================================================

fn year_of(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MovieHit {
    id: i64,
    title: String,
    release_date: Option<String>,
    #[serde(default)]
    popularity: f64,
}

impl From<MovieHit> for SearchResult {
    fn from(hit: MovieHit) -> Self {
        SearchResult {
            id: hit.id,
            year: year_of(hit.release_date.as_deref()),
            title: hit.title,
            popularity: hit.popularity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TvHit {
    id: i64,
    name: String,
    first_air_date: Option<String>,
    #[serde(default)]
    popularity: f64,
}

impl From<TvHit> for SearchResult {
    fn from(hit: TvHit) -> Self {
        SearchResult {
            id: hit.id,
            year: year_of(hit.first_air_date.as_deref()),
            title: hit.name,
            popularity: hit.popularity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    id: i64,
    name: String,
    character: Option<String>,
    order: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct CrewEntry {
    id: i64,
    name: String,
    job: Option<String>,
    department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreditsDto {
    #[serde(default)]
    cast: Vec<CastEntry>,
    #[serde(default)]
    crew: Vec<CrewEntry>,
}

fn cast_member(entry: CastEntry) -> CastMember {
    CastMember {
        person_id: entry.id,
        name: entry.name,
        character: non_empty(entry.character),
        order: entry.order,
    }
}

fn crew_member(entry: CrewEntry) -> CrewMember {
    CrewMember {
        person_id: entry.id,
        name: entry.name,
        job: entry.job,
        department: entry.department,
    }
}

impl From<CreditsDto> for Credits {
    fn from(dto: CreditsDto) -> Self {
        Credits {
            cast: dto.cast.into_iter().map(cast_member).collect(),
            crew: dto.crew.into_iter().map(crew_member).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    id: i64,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    vote_count: i64,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    credits: CreditsDto,
}

impl From<MovieDetails> for MovieMetadata {
    fn from(d: MovieDetails) -> Self {
        let mut movie = MovieMetadata::new(d.id, d.title);
        movie.year = year_of(d.release_date.as_deref());
        movie.original_title = d.original_title;
        movie.overview = non_empty(d.overview);
        movie.release_date = non_empty(d.release_date);
        movie.rating = RatingStats {
            vote_average: d.vote_average,
            vote_count: d.vote_count,
            popularity: d.popularity,
        };
        movie.poster_path = d.poster_path;
        movie.backdrop_path = d.backdrop_path;
        movie.genres = d.genres.into_iter().map(|g| g.name).collect();
        movie.credits = d.credits.into();
        movie
    }
}

#[derive(Debug, Deserialize)]
struct SeasonSummary {
    season_number: i32,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvDetails {
    id: i64,
    name: String,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    vote_count: i64,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    seasons: Vec<SeasonSummary>,
    #[serde(default)]
    credits: CreditsDto,
}

impl From<TvDetails> for TvShowMetadata {
    fn from(d: TvDetails) -> Self {
        let mut show = TvShowMetadata::new(d.id, d.name);
        show.year = year_of(d.first_air_date.as_deref());
        show.original_name = d.original_name;
        show.overview = non_empty(d.overview);
        show.first_air_date = non_empty(d.first_air_date);
        show.rating = RatingStats {
            vote_average: d.vote_average,
            vote_count: d.vote_count,
            popularity: d.popularity,
        };
        show.poster_path = d.poster_path;
        show.backdrop_path = d.backdrop_path;
        show.genres = d.genres.into_iter().map(|g| g.name).collect();
        show.credits = d.credits.into();
        show.seasons = d
            .seasons
            .into_iter()
            .map(|s| Season {
                season_number: s.season_number,
                name: s.name,
                overview: non_empty(s.overview),
                air_date: s.air_date,
                poster_path: s.poster_path,
                credits: Credits::default(),
                episodes: Vec::new(),
            })
            .collect();
        show
    }
}

#[derive(Debug, Deserialize)]
struct EpisodeDetails {
    season_number: i32,
    episode_number: i32,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    still_path: Option<String>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    vote_count: i64,
    #[serde(default)]
    guest_stars: Vec<CastEntry>,
    #[serde(default)]
    crew: Vec<CrewEntry>,
}

impl From<EpisodeDetails> for Episode {
    fn from(d: EpisodeDetails) -> Self {
        Episode {
            season_number: d.season_number,
            episode_number: d.episode_number,
            name: d.name,
            overview: non_empty(d.overview),
            air_date: d.air_date,
            still_path: d.still_path,
            rating: RatingStats {
                vote_average: d.vote_average,
                vote_count: d.vote_count,
                popularity: 0.0,
            },
            credits: Credits {
                cast: d.guest_stars.into_iter().map(cast_member).collect(),
                crew: d.crew.into_iter().map(crew_member).collect(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeasonDetails {
    season_number: i32,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    poster_path: Option<String>,
    #[serde(default)]
    episodes: Vec<EpisodeDetails>,
    #[serde(default)]
    credits: CreditsDto,
}

impl From<SeasonDetails> for Season {
    fn from(d: SeasonDetails) -> Self {
        Season {
            season_number: d.season_number,
            name: d.name,
            overview: non_empty(d.overview),
            air_date: d.air_date,
            poster_path: d.poster_path,
            credits: d.credits.into(),
            episodes: d.episodes.into_iter().map(Episode::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PersonDetails {
    id: i64,
    name: String,
    #[serde(default)]
    popularity: f64,
    biography: Option<String>,
    birthday: Option<String>,
    deathday: Option<String>,
    place_of_birth: Option<String>,
    profile_path: Option<String>,
    known_for_department: Option<String>,
}

impl From<PersonDetails> for PersonMetadata {
    fn from(d: PersonDetails) -> Self {
        let mut person = PersonMetadata::new(d.id, d.name);
        person.popularity = d.popularity;
        person.biography = non_empty(d.biography);
        person.birthday = d.birthday;
        person.deathday = d.deathday;
        person.place_of_birth = d.place_of_birth;
        person.profile_path = d.profile_path;
        person.known_for_department = d.known_for_department;
        person
    }
}
