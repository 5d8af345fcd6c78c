//! Integration tests for the core service façade
//!
//! These tests wire the full service onto an in-memory database, an
//! in-memory catalog and a scripted peer, and verify:
//! - Bootstrap recovers tasks left active by a previous process
//! - Scans, deletions and person cleanup run end to end through the engine
//! - Not-found and validation failures create no task
//! - Library changes are published on the event bus

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream};
use bytes::Bytes;
use core_library::db::create_test_pool;
use core_library::models::{
    CastMember, Episode, LibraryType, MovieMetadata, PersonMetadata, Season, TvShowMetadata,
};
use core_library::repositories::{PersonRepository, SqlitePersonRepository};
use core_metadata::{MetadataError, MetadataProvider, SearchResult};
use core_runtime::config::{CoreConfig, FederationConfig, NodeIdentity, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_service::{CoreDependencies, CoreError, CoreService};
use core_tasks::{
    BackgroundTask, SqliteTaskRepository, TaskArgs, TaskId, TaskPayload, TaskRepository,
    TaskStatus,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Collaborators
// ============================================================================

/// Catalog holding a single movie
struct OneMovieCatalog {
    movie: MovieMetadata,
}

impl OneMovieCatalog {
    fn new() -> Self {
        let mut movie = MovieMetadata::new(550, "Movie Title");
        movie.year = Some(2020);
        movie.credits.cast = vec![CastMember {
            person_id: 7,
            name: "Jane Doe".to_string(),
            character: None,
            order: Some(0),
        }];
        Self { movie }
    }
}

#[async_trait]
impl MetadataProvider for OneMovieCatalog {
    async fn search_movie(&self, title: &str, _year: Option<i32>) -> core_metadata::Result<Vec<SearchResult>> {
        if !self.movie.title.eq_ignore_ascii_case(title) {
            return Ok(Vec::new());
        }
        Ok(vec![SearchResult {
            id: self.movie.id,
            title: self.movie.title.clone(),
            year: self.movie.year,
            popularity: 1.0,
        }])
    }

    async fn get_movie(&self, id: i64) -> core_metadata::Result<MovieMetadata> {
        if id == self.movie.id {
            Ok(self.movie.clone())
        } else {
            Err(MetadataError::NotFound(format!("/movie/{}", id)))
        }
    }

    async fn search_tv(&self, _title: &str, _year: Option<i32>) -> core_metadata::Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    async fn get_tv(&self, id: i64) -> core_metadata::Result<TvShowMetadata> {
        Err(MetadataError::NotFound(format!("/tv/{}", id)))
    }

    async fn get_season(&self, show_id: i64, _season_number: i32) -> core_metadata::Result<Season> {
        Err(MetadataError::NotFound(format!("/tv/{}/season", show_id)))
    }

    async fn get_episode(
        &self,
        show_id: i64,
        _season_number: i32,
        _episode_number: i32,
    ) -> core_metadata::Result<Episode> {
        Err(MetadataError::NotFound(format!("/tv/{}/episode", show_id)))
    }

    async fn get_person(&self, id: i64) -> core_metadata::Result<PersonMetadata> {
        Ok(PersonMetadata::new(id, "Jane Doe"))
    }
}

/// Peer that answers every request with an empty success
struct QuietPeer;

#[async_trait]
impl HttpClient for QuietPeer {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let body = if request.url.ends_with("/health") {
            r#"{"status":"ok","name":"peer"}"#
        } else {
            "{}"
        };
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    async fn download_stream(&self, _request: HttpRequest) -> BridgeResult<HttpStream> {
        Err(BridgeError::NotAvailable("streaming".to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: TempDir,
    pool: SqlitePool,
    core: CoreService,
}

fn dependencies(pool: SqlitePool) -> CoreDependencies {
    CoreDependencies {
        pool,
        http_client: Arc::new(QuietPeer),
        metadata_provider: Arc::new(OneMovieCatalog::new()),
        node_identity: NodeIdentity::new("den", "http://den.local:8080"),
        federation: FederationConfig::default(),
        sync: SyncSettings::default(),
        event_bus: Arc::new(EventBus::new(64)),
    }
}

impl Harness {
    async fn new() -> anyhow::Result<Self> {
        let pool = create_test_pool().await?;
        let core = CoreService::new(dependencies(pool.clone())).await?;
        Ok(Self {
            dir: TempDir::new()?,
            pool,
            core,
        })
    }

    async fn movie_library(&self) -> anyhow::Result<String> {
        let path = self.dir.path().join("movies");
        std::fs::create_dir_all(&path)?;
        std::fs::write(path.join("Movie.Title.2020.1080p.mkv"), b"frames")?;
        let library = self
            .core
            .create_library(LibraryType::Movies, &path.to_string_lossy(), "Movies", None)
            .await?;
        Ok(library.id)
    }

    async fn finished(&self, id: &TaskId) -> anyhow::Result<BackgroundTask> {
        Ok(self.core.wait_for_task(id).await?)
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_bootstrap_from_config() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = CoreConfig::builder()
        .database_path(dir.path().join("core.db"))
        .http_client(Arc::new(QuietPeer))
        .build()?;

    let core = CoreService::bootstrap(config).await?;

    assert!(core.list_libraries().await?.is_empty());
    assert!(core.list_tasks(None, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_new_recovers_interrupted_tasks() -> anyhow::Result<()> {
    let pool = create_test_pool().await?;
    let repository = SqliteTaskRepository::new(pool.clone());
    let mut running = BackgroundTask::new(TaskId::new(), TaskArgs::RefreshMetadata);
    running.transition(TaskStatus::Running)?;
    repository.upsert(&running).await?;

    let core = CoreService::new(dependencies(pool)).await?;

    let task = core.get_task_status(&running.id).await?;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.last_error.as_deref(), Some("Interrupted by shutdown"));
    Ok(())
}

// ============================================================================
// Scan and deletion
// ============================================================================

#[tokio::test]
async fn test_scan_then_delete_movie_cleans_up_people() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let library_id = h.movie_library().await?;

    let scan = h.core.start_scan(Some(vec![library_id])).await?;
    let task = h.finished(&scan).await?;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    match &task.payload {
        TaskPayload::Sync(payload) => {
            assert_eq!(payload.movies_created, 1);
            assert_eq!(payload.files_linked, 1);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let catalog = h.core.local_file_catalog().await?;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].media_provider_id, 550);

    let people = SqlitePersonRepository::new(h.pool.clone());
    assert!(people.find_by_id(7).await?.is_some());

    let cleanup = h.core.delete_movie(550).await?;
    let task = h.finished(&cleanup).await?;
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(people.find_by_id(7).await?.is_none());
    assert!(h.core.local_file_catalog().await?.is_empty());

    let missing = h.core.delete_movie(550).await.unwrap_err();
    assert!(missing.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_scan_of_unknown_library_creates_no_task() -> anyhow::Result<()> {
    let h = Harness::new().await?;

    let err = h
        .core
        .start_scan(Some(vec!["missing".to_string()]))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(h.core.list_tasks(None, 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_refresh_runs_to_completion() -> anyhow::Result<()> {
    let h = Harness::new().await?;

    let id = h.core.start_refresh().await?;
    let task = h.finished(&id).await?;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(h.core.list_tasks(Some(TaskStatus::Completed), 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_task_is_not_found() -> anyhow::Result<()> {
    let h = Harness::new().await?;

    assert!(h.core.get_task_status(&TaskId::new()).await.unwrap_err().is_not_found());
    assert!(h.core.cancel_task(&TaskId::new()).await.unwrap_err().is_not_found());
    Ok(())
}

// ============================================================================
// Libraries
// ============================================================================

#[tokio::test]
async fn test_library_requires_existing_directory() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let missing = h.dir.path().join("nowhere");

    let result = h
        .core
        .create_library(LibraryType::Movies, &missing.to_string_lossy(), "Movies", None)
        .await;
    assert!(matches!(result, Err(CoreError::Library(_))));

    let result = h
        .core
        .create_library(LibraryType::TvShows, "relative/shows", "Shows", None)
        .await;
    assert!(matches!(result, Err(CoreError::Library(_))));

    assert!(h.core.list_libraries().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_library_lifecycle_publishes_events() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let mut events = h.core.subscribe();

    let library_id = h.movie_library().await?;
    let mut library = h.core.get_library(&library_id).await?;
    library.title = "Films".to_string();
    h.core.update_library(library).await?;
    assert_eq!(h.core.get_library(&library_id).await?.title, "Films");

    h.core.delete_library(&library_id).await?;
    assert!(h.core.get_library(&library_id).await.unwrap_err().is_not_found());
    assert!(h.core.delete_library(&library_id).await.unwrap_err().is_not_found());

    assert!(matches!(
        events.recv().await?,
        CoreEvent::Library(LibraryEvent::LibraryCreated { .. })
    ));
    assert_eq!(
        events.recv().await?,
        CoreEvent::Library(LibraryEvent::LibraryDeleted { library_id })
    );
    Ok(())
}

#[tokio::test]
async fn test_deleting_library_drops_its_files() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let library_id = h.movie_library().await?;
    let scan = h.core.start_scan(None).await?;
    h.finished(&scan).await?;
    assert_eq!(h.core.local_file_catalog().await?.len(), 1);

    h.core.delete_library(&library_id).await?;

    assert!(h.core.local_file_catalog().await?.is_empty());
    Ok(())
}

// ============================================================================
// Nodes
// ============================================================================

#[tokio::test]
async fn test_node_management() -> anyhow::Result<()> {
    let h = Harness::new().await?;

    let report = h.core.validate_node("http://peer.local", None).await?;
    assert!(report.reachable);

    let node = h
        .core
        .connect_node("peer", "http://peer.local", Some("k".to_string()), None)
        .await?;
    assert_eq!(h.core.list_nodes().await?.len(), 1);
    assert!(!h.core.disable_node(&node.id).await?.is_enabled);

    let library_id = h.movie_library().await?;
    let err = h
        .core
        .start_download(&node.id, "/movies/x.mkv", &library_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Federation(_)));

    h.core.delete_node(&node.id).await?;
    assert!(h.core.get_node(&node.id).await.unwrap_err().is_not_found());
    assert!(h.core.list_tasks(None, 10).await?.is_empty());
    Ok(())
}
