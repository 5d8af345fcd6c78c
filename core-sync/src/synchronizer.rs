//! # Metadata Synchronizer
//!
//! Reconciles the files of one or more libraries with catalog records.
//!
//! ## Scan
//!
//! 1. Discover media files below each library root
//! 2. Diff against the library's stored file records
//! 3. Extract a title from each new file and match it in the catalog
//! 4. Create or refresh the matched movie or show and link the file
//! 5. Create or refresh every person the touched entries reference
//! 6. Delete records of vanished files; entries left without local files
//!    lose their library linkage but keep their metadata
//!
//! A library whose root cannot be listed is reported and skipped before the
//! diff, so an unmounted disk never removes its records.

use crate::error::{Result, SyncError};
use crate::people::PeopleSync;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::run::{checkpoint, SyncRun};
use crate::scanner::{LibraryScanner, ScannedFile};
use core_library::models::{FileMetadata, Library, MediaType};
use core_library::repositories::{
    FileRepository, LibraryRepository, MovieRepository, PersonRepository, SqliteFileRepository,
    SqliteLibraryRepository, SqliteMovieRepository, SqlitePersonRepository,
    SqliteTvShowRepository, TvShowRepository,
};
use core_library::LibraryError;
use core_metadata::{
    parse_episode_file, parse_movie_file, CatalogMatcher, MetadataProvider, SearchResult,
};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::strip_path;
use core_tasks::{
    PersonCleanupPayload, SyncPayload, TaskArgs, TaskContext, TaskEngine, TaskId, TaskType,
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Repositories the synchronizer reads and writes
#[derive(Clone)]
pub struct SyncRepositories {
    pub libraries: Arc<dyn LibraryRepository>,
    pub movies: Arc<dyn MovieRepository>,
    pub shows: Arc<dyn TvShowRepository>,
    pub people: Arc<dyn PersonRepository>,
    pub files: Arc<dyn FileRepository>,
}

impl SyncRepositories {
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            libraries: Arc::new(SqliteLibraryRepository::new(pool.clone())),
            movies: Arc::new(SqliteMovieRepository::new(pool.clone())),
            shows: Arc::new(SqliteTvShowRepository::new(pool.clone())),
            people: Arc::new(SqlitePersonRepository::new(pool.clone())),
            files: Arc::new(SqliteFileRepository::new(pool)),
        }
    }
}

/// Work found for one reachable library
struct LibraryPlan {
    library: Library,
    new_files: Vec<ScannedFile>,
    missing: Vec<FileMetadata>,
}

/// Title, year and optional episode position extracted from a file
struct Extracted {
    title: String,
    year: Option<i32>,
    episode: Option<(i32, i32)>,
}

pub struct MetadataSynchronizer {
    repos: SyncRepositories,
    matcher: CatalogMatcher,
    reconciler: Reconciler,
    people: PeopleSync,
    scanner: LibraryScanner,
    event_bus: Option<Arc<EventBus>>,
}

impl MetadataSynchronizer {
    pub fn new(
        repos: SyncRepositories,
        provider: Arc<dyn MetadataProvider>,
        settings: &SyncSettings,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            matcher: CatalogMatcher::new(provider.clone()),
            reconciler: Reconciler::new(
                provider.clone(),
                repos.movies.clone(),
                repos.shows.clone(),
                event_bus.clone(),
            ),
            people: PeopleSync::new(
                provider,
                repos.people.clone(),
                repos.movies.clone(),
                repos.shows.clone(),
                event_bus.clone(),
            ),
            scanner: LibraryScanner::new(settings),
            repos,
            event_bus,
        }
    }

    /// Scans `library_ids`, or every library when `None`.
    ///
    /// # Errors
    ///
    /// Fails on cancellation, on fatal catalog errors (missing or rejected
    /// api key) and on storage errors outside per-item work. Everything
    /// else is counted in the payload and kept as the task's last error.
    #[instrument(skip(self, ctx, library_ids), fields(task_id = %ctx.task_id()))]
    pub async fn scan(
        &self,
        ctx: &TaskContext,
        library_ids: Option<&[String]>,
    ) -> Result<SyncPayload> {
        let mut run = SyncRun::new(ctx);
        let libraries = self.resolve_libraries(&mut run, library_ids).await?;
        info!(libraries = libraries.len(), "Starting library scan");

        let mut plans = Vec::with_capacity(libraries.len());
        for library in libraries {
            run.checkpoint()?;
            if let Some(plan) = self.plan_library(&mut run, library).await? {
                plans.push(plan);
            }
        }

        let items: usize = plans
            .iter()
            .map(|plan| plan.new_files.len() + plan.missing.len())
            .sum();
        run.tracker.set_items_total(items as u64);
        run.publish().await;

        for plan in &plans {
            for file in &plan.new_files {
                run.checkpoint()?;
                if let Err(e) = self.process_new_file(&mut run, &plan.library, file).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    run.item_failed(strip_path(&file.file_path()), &e).await;
                }
                run.payload.files_processed += 1;
                run.tracker.item_done();
                run.publish().await;
            }

            self.collect_missing(&mut run, &plan.missing).await?;
            run.payload.libraries_scanned += 1;
        }

        run.tracker.finish_items();
        self.people.sync_collected(&mut run).await?;
        run.publish().await;

        info!(
            scanned = run.payload.libraries_scanned,
            linked = run.payload.files_linked,
            removed = run.payload.files_removed,
            failed = run.payload.items_failed,
            "Library scan finished"
        );
        Ok(run.payload)
    }

    /// Re-fetches every stored movie and show, then their people.
    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id()))]
    pub async fn refresh(&self, ctx: &TaskContext) -> Result<SyncPayload> {
        let mut run = SyncRun::new(ctx);
        let movies = self.repos.movies.find_all().await?;
        let shows = self.repos.shows.find_all().await?;
        info!(movies = movies.len(), shows = shows.len(), "Starting metadata refresh");

        run.tracker
            .set_items_total((movies.len() + shows.len()) as u64);
        run.publish().await;

        for movie in &movies {
            run.checkpoint()?;
            match self.reconciler.reconcile_movie(movie.id, None).await {
                Ok((movie, _)) => {
                    run.payload.movies_updated += 1;
                    run.people.extend(movie.person_ids());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => run.item_failed(&format!("movie {}", movie.id), &e).await,
            }
            run.tracker.item_done();
            run.publish().await;
        }

        for show in &shows {
            run.checkpoint()?;
            match self.reconciler.reconcile_show(ctx, show.id, None).await {
                Ok((show, _)) => {
                    run.payload.shows_updated += 1;
                    run.people.extend(show.person_ids());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => run.item_failed(&format!("show {}", show.id), &e).await,
            }
            run.tracker.item_done();
            run.publish().await;
        }

        run.tracker.finish_items();
        self.people.sync_collected(&mut run).await?;
        run.publish().await;

        info!(
            movies = run.payload.movies_updated,
            shows = run.payload.shows_updated,
            failed = run.payload.items_failed,
            "Metadata refresh finished"
        );
        Ok(run.payload)
    }

    /// Deletes the people in `person_ids` that nothing references anymore.
    #[instrument(skip(self, ctx, person_ids), fields(task_id = %ctx.task_id(), candidates = person_ids.len()))]
    pub async fn person_cleanup(
        &self,
        ctx: &TaskContext,
        person_ids: &[i64],
    ) -> Result<PersonCleanupPayload> {
        checkpoint(ctx)?;
        self.people.cleanup(ctx, person_ids).await
    }

    /// Deletes a movie with its local file records and submits a person
    /// cleanup for the people it referenced.
    #[instrument(skip(self, engine))]
    pub async fn delete_movie(&self, id: i64, engine: &TaskEngine) -> Result<TaskId> {
        let movie = self
            .repos
            .movies
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Movie", id))?;

        let files = self
            .repos
            .files
            .delete_local_for_media(MediaType::Movie, id)
            .await?;
        self.repos.movies.delete(id).await?;
        info!(movie_id = id, files, "Movie deleted");
        self.emit(LibraryEvent::MovieDeleted { movie_id: id });

        self.submit_cleanup(engine, movie.person_ids().into_iter().collect())
            .await
    }

    /// Show counterpart of [`delete_movie`](Self::delete_movie); season and
    /// episode credits count as references.
    #[instrument(skip(self, engine))]
    pub async fn delete_show(&self, id: i64, engine: &TaskEngine) -> Result<TaskId> {
        let show = self
            .repos
            .shows
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("TvShow", id))?;

        let files = self
            .repos
            .files
            .delete_local_for_media(MediaType::TvShow, id)
            .await?;
        self.repos.shows.delete(id).await?;
        info!(show_id = id, files, "Show deleted");
        self.emit(LibraryEvent::ShowDeleted { show_id: id });

        self.submit_cleanup(engine, show.person_ids().into_iter().collect())
            .await
    }

    async fn submit_cleanup(&self, engine: &TaskEngine, person_ids: Vec<i64>) -> Result<TaskId> {
        let task_id = engine
            .submit(TaskType::PersonCleanup, TaskArgs::PersonCleanup { person_ids })
            .await?;
        debug!(%task_id, "Person cleanup submitted");
        Ok(task_id)
    }

    async fn resolve_libraries(
        &self,
        run: &mut SyncRun<'_>,
        library_ids: Option<&[String]>,
    ) -> Result<Vec<Library>> {
        let Some(ids) = library_ids else {
            return Ok(self.repos.libraries.find_all().await?);
        };

        let mut libraries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.repos.libraries.find_by_id(id).await? {
                Some(library) => libraries.push(library),
                None => {
                    warn!(library_id = %id, "Library to scan does not exist");
                    run.payload.libraries_failed += 1;
                    run.ctx()
                        .record_error(format!("Library {} not found", id))
                        .await;
                }
            }
        }
        Ok(libraries)
    }

    /// Discovers and diffs one library. `None` when its root is unreachable.
    async fn plan_library(
        &self,
        run: &mut SyncRun<'_>,
        library: Library,
    ) -> Result<Option<LibraryPlan>> {
        let discovery = match self
            .scanner
            .discover(Path::new(&library.directory_path))
            .await
        {
            Ok(discovery) => discovery,
            Err(e @ SyncError::LibraryUnreachable { .. }) => {
                warn!(library_id = %library.id, error = %e, "Skipping unreachable library");
                run.payload.libraries_failed += 1;
                run.ctx().record_error(e.to_string()).await;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        for path in &discovery.unreadable {
            run.ctx()
                .record_error(format!("{}: unreadable, its records are kept", path.display()))
                .await;
        }

        let on_disk = &discovery.files;
        let stored = self.repos.files.find_by_library(&library.id).await?;
        let known: HashSet<&str> = stored.iter().map(|f| f.file_path.as_str()).collect();
        let disk_paths: HashSet<String> = on_disk.iter().map(ScannedFile::file_path).collect();

        let new_files: Vec<ScannedFile> = on_disk
            .iter()
            .filter(|file| !known.contains(file.file_path().as_str()))
            .cloned()
            .collect();
        let missing: Vec<FileMetadata> = stored
            .iter()
            .filter(|record| !disk_paths.contains(&record.file_path))
            .filter(|record| !discovery.is_unverified(&record.file_path))
            .cloned()
            .collect();

        debug!(
            library_id = %library.id,
            discovered = on_disk.len(),
            new = new_files.len(),
            missing = missing.len(),
            "Library diffed"
        );
        run.payload.files_discovered += on_disk.len() as u64;
        run.payload.files_new += new_files.len() as u64;
        run.payload.files_missing += missing.len() as u64;

        Ok(Some(LibraryPlan {
            library,
            new_files,
            missing,
        }))
    }

    async fn process_new_file(
        &self,
        run: &mut SyncRun<'_>,
        library: &Library,
        file: &ScannedFile,
    ) -> Result<()> {
        let media_type = library.library_type.media_type();
        let Some(extracted) = extract(media_type, &file.path) else {
            debug!(file = strip_path(&file.file_path()), "No title extracted, skipping");
            run.payload.files_skipped += 1;
            return Ok(());
        };

        let Some(hit) = self.find_match(run, media_type, &extracted).await? else {
            debug!(title = %extracted.title, year = ?extracted.year, "No catalog match, skipping");
            run.payload.files_skipped += 1;
            return Ok(());
        };

        if !run.is_reconciled(media_type, hit.id) {
            let (outcome, people) = match media_type {
                MediaType::Movie => {
                    let (movie, outcome) = self
                        .reconciler
                        .reconcile_movie(hit.id, Some(&library.id))
                        .await?;
                    (outcome, movie.person_ids())
                }
                MediaType::TvShow => {
                    let (show, outcome) = self
                        .reconciler
                        .reconcile_show(run.ctx(), hit.id, Some(&library.id))
                        .await?;
                    (outcome, show.person_ids())
                }
            };
            count_outcome(&mut run.payload, media_type, outcome);
            run.people.extend(people);
            run.mark_reconciled(media_type, hit.id);
        }

        let hash = self.scanner.fingerprint(file).await?;
        let mut record = FileMetadata::local(&library.id, media_type, hit.id, file.file_path())
            .with_file_size(file.size as i64)
            .with_content_hash(hash);
        if let Some((season, episode)) = extracted.episode {
            record = record.with_episode(season, episode);
        }

        if self.repos.files.insert(&record).await? {
            run.payload.files_linked += 1;
            self.emit(LibraryEvent::FileAdded {
                file_id: record.id.clone(),
                file_path: record.file_path.clone(),
            });
        }
        Ok(())
    }

    async fn find_match(
        &self,
        run: &mut SyncRun<'_>,
        media_type: MediaType,
        extracted: &Extracted,
    ) -> Result<Option<SearchResult>> {
        if let Some(hit) = run.cached_match(media_type, &extracted.title, extracted.year) {
            return Ok(hit);
        }

        let hit = match media_type {
            MediaType::Movie => {
                self.matcher
                    .match_movie(&extracted.title, extracted.year)
                    .await?
            }
            MediaType::TvShow => {
                self.matcher
                    .match_show(&extracted.title, extracted.year)
                    .await?
            }
        };
        run.remember_match(media_type, &extracted.title, extracted.year, hit.clone());
        Ok(hit)
    }

    /// Deletes records of vanished files, then clears the library linkage
    /// of entries left without any local file.
    async fn collect_missing(&self, run: &mut SyncRun<'_>, missing: &[FileMetadata]) -> Result<()> {
        let mut affected: HashSet<(MediaType, i64)> = HashSet::new();

        for record in missing {
            run.checkpoint()?;
            match self.repos.files.delete(&record.id).await {
                Ok(true) => {
                    run.payload.files_removed += 1;
                    affected.insert((record.media_type, record.media_provider_id));
                    self.emit(LibraryEvent::FileRemoved {
                        file_id: record.id.clone(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    run.item_failed(strip_path(&record.file_path), &e.into())
                        .await
                }
            }
            run.tracker.item_done();
            run.publish().await;
        }

        for (media_type, id) in affected {
            if !self
                .repos
                .files
                .find_local_for_media(media_type, id)
                .await?
                .is_empty()
            {
                continue;
            }

            let unlinked = match media_type {
                MediaType::Movie => self.repos.movies.set_library(id, None).await,
                MediaType::TvShow => self.repos.shows.set_library(id, None).await,
            };
            match unlinked {
                Ok(()) => debug!(%media_type, id, "Entry lost its last local file, unlinked"),
                Err(e) => warn!(%media_type, id, error = %e, "Failed to unlink entry"),
            }
        }
        Ok(())
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }
}

fn extract(media_type: MediaType, path: &Path) -> Option<Extracted> {
    match media_type {
        MediaType::Movie => parse_movie_file(path).map(|parsed| Extracted {
            title: parsed.title,
            year: parsed.year,
            episode: None,
        }),
        MediaType::TvShow => parse_episode_file(path).map(|parsed| Extracted {
            title: parsed.show_title,
            year: parsed.year,
            episode: Some((parsed.season_number, parsed.episode_number)),
        }),
    }
}

fn count_outcome(payload: &mut SyncPayload, media_type: MediaType, outcome: ReconcileOutcome) {
    match (media_type, outcome) {
        (MediaType::Movie, ReconcileOutcome::Created) => payload.movies_created += 1,
        (MediaType::Movie, ReconcileOutcome::Updated) => payload.movies_updated += 1,
        (MediaType::TvShow, ReconcileOutcome::Created) => payload.shows_created += 1,
        (MediaType::TvShow, ReconcileOutcome::Updated) => payload.shows_updated += 1,
    }
}
