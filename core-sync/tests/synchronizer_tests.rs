//! Integration tests for the metadata synchronizer
//!
//! These tests run scans through the task engine against real directories
//! and an in-memory catalog, and verify:
//! - New files are matched, reconciled and linked exactly once
//! - Re-scanning an unchanged library makes no catalog calls
//! - Vanished files are removed and their entries unlinked
//! - Unreachable libraries keep their records
//! - Person cleanup respects remaining references

use async_trait::async_trait;
use core_library::db::create_test_pool;
use core_library::models::{
    CastMember, Credits, Episode, Library, LibraryType, MediaType, MovieMetadata, PersonMetadata,
    Season, TvShowMetadata,
};
use core_metadata::{MetadataError, MetadataProvider, SearchResult};
use core_runtime::config::SyncSettings;
use core_sync::{
    MetadataSynchronizer, PersonCleanupExecutor, RefreshExecutor, ScanExecutor, SyncRepositories,
};
use core_tasks::{
    BackgroundTask, SyncPayload, TaskArgs, TaskEngine, TaskId, TaskPayload, TaskStatus, TaskType,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fake catalog
// ============================================================================

#[derive(Default)]
struct FakeCatalog {
    movies: HashMap<i64, MovieMetadata>,
    shows: HashMap<i64, TvShowMetadata>,
    calls: AtomicUsize,
    reject_key: AtomicBool,
}

impl FakeCatalog {
    fn with_movie(mut self, movie: MovieMetadata) -> Self {
        self.movies.insert(movie.id, movie);
        self
    }

    fn with_show(mut self, show: TvShowMetadata) -> Self {
        self.shows.insert(show.id, show);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call(&self) -> core_metadata::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_key.load(Ordering::SeqCst) {
            Err(MetadataError::InvalidApiKey { status: 401 })
        } else {
            Ok(())
        }
    }

    fn show(&self, id: i64) -> core_metadata::Result<&TvShowMetadata> {
        self.shows
            .get(&id)
            .ok_or_else(|| MetadataError::NotFound(format!("/tv/{}", id)))
    }
}

fn hit(id: i64, title: &str, year: Option<i32>, popularity: f64) -> SearchResult {
    SearchResult {
        id,
        title: title.to_string(),
        year,
        popularity,
    }
}

#[async_trait]
impl MetadataProvider for FakeCatalog {
    async fn search_movie(&self, title: &str, year: Option<i32>) -> core_metadata::Result<Vec<SearchResult>> {
        self.call()?;
        Ok(self
            .movies
            .values()
            .filter(|m| m.title.eq_ignore_ascii_case(title))
            .filter(|m| year.is_none() || m.year == year)
            .map(|m| hit(m.id, &m.title, m.year, m.rating.popularity))
            .collect())
    }

    async fn get_movie(&self, id: i64) -> core_metadata::Result<MovieMetadata> {
        self.call()?;
        self.movies
            .get(&id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("/movie/{}", id)))
    }

    async fn search_tv(&self, title: &str, year: Option<i32>) -> core_metadata::Result<Vec<SearchResult>> {
        self.call()?;
        Ok(self
            .shows
            .values()
            .filter(|s| s.name.eq_ignore_ascii_case(title))
            .filter(|s| year.is_none() || s.year == year)
            .map(|s| hit(s.id, &s.name, s.year, s.rating.popularity))
            .collect())
    }

    async fn get_tv(&self, id: i64) -> core_metadata::Result<TvShowMetadata> {
        self.call()?;
        let mut show = self.show(id)?.clone();
        for season in &mut show.seasons {
            season.episodes.clear();
        }
        Ok(show)
    }

    async fn get_season(&self, show_id: i64, season_number: i32) -> core_metadata::Result<Season> {
        self.call()?;
        self.show(show_id)?
            .season(season_number)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound("season".to_string()))
    }

    async fn get_episode(
        &self,
        show_id: i64,
        season_number: i32,
        episode_number: i32,
    ) -> core_metadata::Result<Episode> {
        self.call()?;
        self.show(show_id)?
            .season(season_number)
            .and_then(|season| season.episode(episode_number))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound("episode".to_string()))
    }

    async fn get_person(&self, id: i64) -> core_metadata::Result<PersonMetadata> {
        self.call()?;
        Ok(PersonMetadata::new(id, format!("Person {}", id)))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn cast(person_id: i64, name: &str) -> CastMember {
    CastMember {
        person_id,
        name: name.to_string(),
        character: None,
        order: None,
    }
}

fn movie(id: i64, title: &str, year: i32, cast_ids: &[i64]) -> MovieMetadata {
    let mut movie = MovieMetadata::new(id, title);
    movie.year = Some(year);
    movie.rating.popularity = 10.0;
    movie.credits.cast = cast_ids
        .iter()
        .map(|id| cast(*id, &format!("Person {}", id)))
        .collect();
    movie
}

fn show_with_episodes(id: i64, name: &str, episodes: &[(i32, i32)], guest: Option<i64>) -> TvShowMetadata {
    let mut show = TvShowMetadata::new(id, name);
    show.rating.popularity = 5.0;
    for (season_number, episode_number) in episodes {
        if show.season(*season_number).is_none() {
            show.seasons.push(Season {
                season_number: *season_number,
                name: None,
                overview: None,
                air_date: None,
                poster_path: None,
                credits: Credits::default(),
                episodes: Vec::new(),
            });
        }
        let credits = Credits {
            cast: guest.map(|id| vec![cast(id, "Guest")]).unwrap_or_default(),
            crew: Vec::new(),
        };
        if let Some(season) = show
            .seasons
            .iter_mut()
            .find(|s| s.season_number == *season_number)
        {
            season.episodes.push(Episode {
                season_number: *season_number,
                episode_number: *episode_number,
                name: None,
                overview: None,
                air_date: None,
                still_path: None,
                rating: Default::default(),
                credits,
            });
        }
    }
    show
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    repos: SyncRepositories,
    engine: TaskEngine,
    catalog: Arc<FakeCatalog>,
    synchronizer: Arc<MetadataSynchronizer>,
}

impl Harness {
    async fn new(catalog: FakeCatalog) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path().to_path_buf();
        let pool = create_test_pool().await?;
        let repos = SyncRepositories::sqlite(pool);
        let catalog = Arc::new(catalog);
        let synchronizer = Arc::new(MetadataSynchronizer::new(
            repos.clone(),
            catalog.clone(),
            &SyncSettings::default(),
            None,
        ));
        let engine = TaskEngine::builder()
            .with_executor(Arc::new(ScanExecutor::new(synchronizer.clone())))
            .with_executor(Arc::new(RefreshExecutor::new(synchronizer.clone())))
            .with_executor(Arc::new(PersonCleanupExecutor::new(synchronizer.clone())))
            .build();

        Ok(Self {
            _dir: dir,
            root,
            repos,
            engine,
            catalog,
            synchronizer,
        })
    }

    async fn library(&self, library_type: LibraryType, name: &str) -> anyhow::Result<Library> {
        let path = self.root.join(name);
        std::fs::create_dir_all(&path)?;
        let library = Library::new(library_type, path.to_string_lossy(), name);
        self.repos.libraries.insert(&library).await?;
        Ok(library)
    }

    async fn run(&self, task_type: TaskType, args: TaskArgs) -> anyhow::Result<BackgroundTask> {
        let id = self.engine.submit(task_type, args).await?;
        Ok(self.engine.wait(&id).await?)
    }

    async fn scan(&self) -> anyhow::Result<BackgroundTask> {
        self.run(
            TaskType::ScanLibraries,
            TaskArgs::ScanLibraries { library_ids: None },
        )
        .await
    }

    async fn wait(&self, id: TaskId) -> anyhow::Result<BackgroundTask> {
        Ok(self.engine.wait(&id).await?)
    }
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"not really a video").unwrap();
}

fn sync_payload(task: &BackgroundTask) -> SyncPayload {
    match &task.payload {
        TaskPayload::Sync(payload) => payload.clone(),
        other => panic!("expected sync payload, got {:?}", other),
    }
}

// ============================================================================
// Scan
// ============================================================================

#[tokio::test]
async fn test_single_movie_is_matched_and_linked() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[1, 2]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    touch(&Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv"));

    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    assert!(task.last_error.is_none());

    let stored = h.repos.movies.find_by_id(550).await?.expect("movie created");
    assert_eq!(stored.library_id.as_deref(), Some(library.id.as_str()));

    let files = h.repos.files.find_by_library(&library.id).await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].media_type, MediaType::Movie);
    assert_eq!(files[0].media_provider_id, 550);
    assert_eq!(files[0].content_hash.as_deref().map(str::len), Some(64));

    let payload = sync_payload(&task);
    assert_eq!(payload.files_new, 1);
    assert_eq!(payload.files_linked, 1);
    assert_eq!(payload.movies_created, 1);
    assert_eq!(payload.people_synced, 2);
    assert_eq!(h.repos.people.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_rescan_of_unchanged_library_makes_no_catalog_calls() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[1]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    touch(&Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv"));

    h.scan().await?;
    let calls_after_first = h.catalog.calls();
    assert!(calls_after_first > 0);

    let second = h.scan().await?;

    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(h.catalog.calls(), calls_after_first);
    assert_eq!(h.repos.movies.count().await?, 1);
    assert_eq!(h.repos.files.count().await?, 1);

    let payload = sync_payload(&second);
    assert_eq!(payload.files_discovered, 1);
    assert_eq!(payload.files_new, 0);
    assert_eq!(payload.files_linked, 0);
    Ok(())
}

#[tokio::test]
async fn test_copies_of_one_title_resolve_once() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    let root = Path::new(&library.directory_path);
    touch(&root.join("Movie.Title.2020.1080p.mkv"));
    touch(&root.join("Movie.Title.2020.720p.mkv"));

    let task = h.scan().await?;

    // One year search plus one detail fetch
    assert_eq!(h.catalog.calls(), 2);
    assert_eq!(h.repos.movies.count().await?, 1);
    assert_eq!(h.repos.files.count().await?, 2);
    assert_eq!(sync_payload(&task).movies_created, 1);
    Ok(())
}

#[tokio::test]
async fn test_unmatched_and_unparseable_files_are_skipped() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default()).await?;
    let library = h.library(LibraryType::TvShows, "shows").await?;
    let root = Path::new(&library.directory_path);
    touch(&root.join("Unknown.Show.S01E01.mkv"));
    touch(&root.join("no-episode-marker.mkv"));

    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    let payload = sync_payload(&task);
    assert_eq!(payload.files_skipped, 2);
    assert_eq!(payload.items_failed, 0);
    assert_eq!(h.repos.files.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_episode_files_link_to_deep_fetched_show() -> anyhow::Result<()> {
    let show = show_with_episodes(1399, "Show Name", &[(1, 1), (1, 2), (2, 1)], Some(77));
    let h = Harness::new(FakeCatalog::default().with_show(show)).await?;
    let library = h.library(LibraryType::TvShows, "shows").await?;
    let root = Path::new(&library.directory_path).join("Show Name");
    touch(&root.join("Season 01").join("Show.Name.S01E02.mkv"));
    touch(&root.join("Season 02").join("Show.Name.S02E01.mkv"));

    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    let stored = h.repos.shows.find_by_id(1399).await?.expect("show created");
    assert_eq!(stored.episode_count(), 3);
    assert!(stored.references(77));

    let mut files = h.repos.files.find_by_library(&library.id).await?;
    files.sort_by_key(|f| (f.season_number, f.episode_number));
    let positions: Vec<_> = files
        .iter()
        .map(|f| (f.season_number, f.episode_number))
        .collect();
    assert_eq!(positions, vec![(Some(1), Some(2)), (Some(2), Some(1))]);

    let payload = sync_payload(&task);
    assert_eq!(payload.shows_created, 1);
    assert_eq!(payload.people_synced, 1);
    Ok(())
}

// ============================================================================
// Garbage collection and unreachable libraries
// ============================================================================

#[tokio::test]
async fn test_vanished_file_is_removed_and_movie_unlinked() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    let file = Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv");
    touch(&file);
    h.scan().await?;

    std::fs::remove_file(&file)?;
    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(sync_payload(&task).files_removed, 1);
    assert_eq!(h.repos.files.count().await?, 0);

    // Metadata stays, linkage is cleared
    let stored = h.repos.movies.find_by_id(550).await?.expect("movie kept");
    assert!(stored.library_id.is_none());

    // The file comes back and re-attaches the entry
    touch(&file);
    h.scan().await?;
    let stored = h.repos.movies.find_by_id(550).await?.expect("movie kept");
    assert_eq!(stored.library_id.as_deref(), Some(library.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_library_keeps_its_records() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    touch(&Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv"));
    h.scan().await?;

    std::fs::remove_dir_all(&library.directory_path)?;
    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.last_error.is_some());
    let payload = sync_payload(&task);
    assert_eq!(payload.libraries_failed, 1);
    assert_eq!(payload.libraries_scanned, 0);
    assert_eq!(h.repos.files.count().await?, 1);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_subdirectory_keeps_its_records() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    let nas = TempDir::new()?;
    touch(&nas.path().join("Movie.Title.2020.1080p.mkv"));
    std::os::unix::fs::symlink(nas.path(), Path::new(&library.directory_path).join("nas"))?;
    h.scan().await?;
    assert_eq!(h.repos.files.count().await?, 1);

    // Link target goes away, the link itself stays
    drop(nas);
    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.last_error.as_deref().is_some_and(|e| e.contains("nas")));
    let payload = sync_payload(&task);
    assert_eq!(payload.files_removed, 0);
    assert_eq!(payload.libraries_scanned, 1);
    assert_eq!(h.repos.files.count().await?, 1);
    let stored = h.repos.movies.find_by_id(550).await?.expect("movie kept");
    assert_eq!(stored.library_id.as_deref(), Some(library.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_rejected_api_key_fails_the_task() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default()).await?;
    h.catalog.reject_key.store(true, Ordering::SeqCst);
    let library = h.library(LibraryType::Movies, "movies").await?;
    touch(&Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv"));

    let task = h.scan().await?;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.last_error.unwrap_or_default().contains("401"));
    Ok(())
}

#[tokio::test]
async fn test_refresh_updates_every_entry() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default().with_movie(movie(550, "Movie Title", 2020, &[5]))).await?;
    let library = h.library(LibraryType::Movies, "movies").await?;
    touch(&Path::new(&library.directory_path).join("Movie.Title.2020.1080p.mkv"));
    h.scan().await?;

    let task = h
        .run(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
        .await?;

    assert_eq!(task.status, TaskStatus::Completed);
    let payload = sync_payload(&task);
    assert_eq!(payload.movies_updated, 1);
    assert_eq!(payload.people_synced, 1);
    let stored = h.repos.movies.find_by_id(550).await?.expect("movie kept");
    assert_eq!(stored.library_id.as_deref(), Some(library.id.as_str()));
    Ok(())
}

// ============================================================================
// Deletion and person cleanup
// ============================================================================

#[tokio::test]
async fn test_person_survives_while_a_show_references_them() -> anyhow::Result<()> {
    const JANE: i64 = 1001;
    let h = Harness::new(FakeCatalog::default()).await?;

    h.repos.movies.insert(&movie(550, "Movie Title", 2020, &[JANE])).await?;
    h.repos
        .shows
        .insert(&show_with_episodes(1399, "Show Name", &[(1, 1)], Some(JANE)))
        .await?;
    h.repos.people.upsert(&PersonMetadata::new(JANE, "Jane Doe")).await?;

    let cleanup = h.synchronizer.delete_movie(550, &h.engine).await?;
    let task = h.wait(cleanup).await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(h.repos.movies.find_by_id(550).await?.is_none());
    assert!(h.repos.people.find_by_id(JANE).await?.is_some());

    let cleanup = h.synchronizer.delete_show(1399, &h.engine).await?;
    let task = h.wait(cleanup).await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert!(h.repos.people.find_by_id(JANE).await?.is_none());
    match task.payload {
        TaskPayload::PersonCleanup(payload) => {
            assert_eq!(payload.people_checked, 1);
            assert_eq!(payload.people_deleted, 1);
        }
        other => panic!("expected cleanup payload, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_deleting_unknown_movie_submits_nothing() -> anyhow::Result<()> {
    let h = Harness::new(FakeCatalog::default()).await?;

    assert!(h.synchronizer.delete_movie(42, &h.engine).await.is_err());
    assert!(h.engine.list(None, 10).await?.is_empty());
    Ok(())
}
