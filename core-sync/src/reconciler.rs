//! Catalog reconciliation
//!
//! Creates or refreshes movie and show records from the catalog. Existing
//! records are re-read, merged with the fresh fetch and written back as a
//! whole, so repeated runs converge on one row per catalog id.

use crate::error::Result;
use crate::run::checkpoint;
use core_library::models::{MovieMetadata, Season, TvShowMetadata};
use core_library::repositories::{MovieRepository, TvShowRepository};
use core_metadata::MetadataProvider;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_tasks::TaskContext;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
}

pub struct Reconciler {
    provider: Arc<dyn MetadataProvider>,
    movies: Arc<dyn MovieRepository>,
    shows: Arc<dyn TvShowRepository>,
    event_bus: Option<Arc<EventBus>>,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        movies: Arc<dyn MovieRepository>,
        shows: Arc<dyn TvShowRepository>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            provider,
            movies,
            shows,
            event_bus,
        }
    }

    /// Fetches movie `id` and writes it.
    ///
    /// `library_id` replaces the library linkage when given; `None` keeps the
    /// stored linkage.
    pub async fn reconcile_movie(
        &self,
        id: i64,
        library_id: Option<&str>,
    ) -> Result<(MovieMetadata, ReconcileOutcome)> {
        let fetched = self.provider.get_movie(id).await?;

        match self.movies.find_by_id(id).await? {
            Some(existing) => {
                let mut movie = existing.refreshed_from(fetched);
                if let Some(library_id) = library_id {
                    movie.library_id = Some(library_id.to_string());
                }
                self.movies.update(&movie).await?;
                debug!(movie_id = id, "Movie updated");
                self.emit(LibraryEvent::MovieUpdated { movie_id: id });
                Ok((movie, ReconcileOutcome::Updated))
            }
            None => {
                let mut movie = fetched;
                movie.id = id;
                movie.library_id = library_id.map(str::to_string);
                self.movies.insert(&movie).await?;
                debug!(movie_id = id, title = %movie.title, "Movie created");
                self.emit(LibraryEvent::MovieAdded {
                    movie_id: id,
                    title: movie.title.clone(),
                });
                Ok((movie, ReconcileOutcome::Created))
            }
        }
    }

    /// Deep-fetches show `id` and writes it. Linkage rules match
    /// [`reconcile_movie`](Self::reconcile_movie).
    pub async fn reconcile_show(
        &self,
        ctx: &TaskContext,
        id: i64,
        library_id: Option<&str>,
    ) -> Result<(TvShowMetadata, ReconcileOutcome)> {
        let fetched = self.fetch_show(ctx, id).await?;

        match self.shows.find_by_id(id).await? {
            Some(existing) => {
                let mut show = existing.refreshed_from(fetched);
                if let Some(library_id) = library_id {
                    show.library_id = Some(library_id.to_string());
                }
                self.shows.update(&show).await?;
                debug!(show_id = id, "Show updated");
                self.emit(LibraryEvent::ShowUpdated { show_id: id });
                Ok((show, ReconcileOutcome::Updated))
            }
            None => {
                let mut show = fetched;
                show.id = id;
                show.library_id = library_id.map(str::to_string);
                self.shows.insert(&show).await?;
                debug!(show_id = id, name = %show.name, "Show created");
                self.emit(LibraryEvent::ShowAdded {
                    show_id: id,
                    name: show.name.clone(),
                });
                Ok((show, ReconcileOutcome::Created))
            }
        }
    }

    /// Show details plus one season call per season and one episode call
    /// per episode. Non-fatal failures fall back to the coarser listing: a
    /// season keeps what `get_tv` reported, an episode keeps its season
    /// summary.
    async fn fetch_show(&self, ctx: &TaskContext, id: i64) -> Result<TvShowMetadata> {
        let mut show = self.provider.get_tv(id).await?;
        let mut seasons: Vec<Season> = Vec::with_capacity(show.seasons.len());

        for listed in &show.seasons {
            checkpoint(ctx)?;
            let mut season = match self.provider.get_season(id, listed.season_number).await {
                Ok(season) => season,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        show_id = id,
                        season = listed.season_number,
                        error = %e,
                        "Season details unavailable, keeping show listing"
                    );
                    listed.clone()
                }
            };

            let mut episodes = Vec::with_capacity(season.episodes.len());
            for summary in &season.episodes {
                checkpoint(ctx)?;
                match self
                    .provider
                    .get_episode(id, summary.season_number, summary.episode_number)
                    .await
                {
                    Ok(episode) => episodes.push(episode),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!(
                            show_id = id,
                            season = summary.season_number,
                            episode = summary.episode_number,
                            error = %e,
                            "Episode details unavailable, keeping season summary"
                        );
                        episodes.push(summary.clone());
                    }
                }
            }
            season.episodes = episodes;
            seasons.push(season);
        }

        show.seasons = seasons;
        Ok(show)
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }
}
