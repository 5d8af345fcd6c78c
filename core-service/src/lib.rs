//! Core service façade and bootstrap helpers.
//!
//! This crate wires the task engine, the metadata synchronizer and the node
//! federation service onto one database and one event bus, and exposes the
//! operations host applications call. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) so a missing
//! HTTP client is replaced by the `reqwest` adapter.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/mediahub/core.db")
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! let task_id = core.start_scan(None).await?;
//! let task = core.wait_for_task(&task_id).await?;
//! println!("scan finished as {}", task.status);
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::ReqwestHttpClient;

use std::path::Path;
use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_federation::{
    CatalogSyncSummary, DownloadExecutor, FederationRepositories, FederationService, NodeClient,
    RemoteFileRecord, ValidationReport,
};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{now_timestamp, Library, LibraryType, NodeInfo};
use core_library::repositories::{LibraryRepository, SqliteLibraryRepository};
use core_library::LibraryError;
use core_metadata::{MetadataProvider, TmdbClient};
use core_runtime::config::{CoreConfig, FederationConfig, NodeIdentity, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, EventStream, LibraryEvent};
use core_sync::{
    MetadataSynchronizer, PersonCleanupExecutor, RefreshExecutor, ScanExecutor, SyncRepositories,
};
use core_tasks::{
    BackgroundTask, SqliteTaskRepository, TaskArgs, TaskEngine, TaskId, TaskStatus, TaskType,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast::Receiver;
use tracing::{info, instrument, warn};

/// Aggregated handle to everything the core needs from its host.
pub struct CoreDependencies {
    pub pool: SqlitePool,
    pub http_client: Arc<dyn HttpClient>,
    pub metadata_provider: Arc<dyn MetadataProvider>,
    pub node_identity: NodeIdentity,
    pub federation: FederationConfig,
    pub sync: SyncSettings,
    pub event_bus: Arc<EventBus>,
}

impl CoreDependencies {
    /// Opens the database and builds the catalog client described by
    /// `config`.
    pub async fn from_config(config: &CoreConfig) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let metadata_provider: Arc<dyn MetadataProvider> = Arc::new(TmdbClient::new(
            config.http_client.clone(),
            config.metadata_api_config.clone(),
        ));

        Ok(Self {
            pool,
            http_client: config.http_client.clone(),
            metadata_provider,
            node_identity: config.node_identity.clone(),
            federation: config.federation.clone(),
            sync: config.sync.clone(),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        })
    }
}

struct ServiceInner {
    libraries: Arc<dyn LibraryRepository>,
    engine: TaskEngine,
    synchronizer: Arc<MetadataSynchronizer>,
    federation: FederationService,
    event_bus: Arc<EventBus>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Builds the service from a validated configuration.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(&config).await?;
        Self::new(deps).await
    }

    /// Wires the components onto `deps` and recovers tasks a previous
    /// process left active.
    pub async fn new(deps: CoreDependencies) -> Result<Self> {
        let CoreDependencies {
            pool,
            http_client,
            metadata_provider,
            node_identity,
            federation,
            sync,
            event_bus,
        } = deps;

        node_identity.validate()?;
        federation.validate()?;
        sync.validate()?;

        let synchronizer = Arc::new(MetadataSynchronizer::new(
            SyncRepositories::sqlite(pool.clone()),
            metadata_provider,
            &sync,
            Some(event_bus.clone()),
        ));

        let federation_repos = FederationRepositories::sqlite(pool.clone());
        let client = NodeClient::new(http_client, federation);
        let federation = FederationService::new(
            client.clone(),
            federation_repos.clone(),
            node_identity,
            Some(event_bus.clone()),
        );

        let engine = TaskEngine::builder()
            .with_executor(Arc::new(ScanExecutor::new(synchronizer.clone())))
            .with_executor(Arc::new(RefreshExecutor::new(synchronizer.clone())))
            .with_executor(Arc::new(PersonCleanupExecutor::new(synchronizer.clone())))
            .with_executor(Arc::new(DownloadExecutor::new(
                client,
                federation_repos,
                Some(event_bus.clone()),
            )))
            .with_repository(Arc::new(SqliteTaskRepository::new(pool.clone())))
            .with_event_bus(event_bus.clone())
            .build();

        let recovered = engine.recover_interrupted().await?;
        if recovered > 0 {
            warn!(recovered, "Marked interrupted tasks as failed");
        }
        info!("Core service initialized");

        Ok(Self {
            inner: Arc::new(ServiceInner {
                libraries: Arc::new(SqliteLibraryRepository::new(pool)),
                engine,
                synchronizer,
                federation,
                event_bus,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn events(&self) -> EventStream {
        self.inner.event_bus.stream()
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Scans the given libraries, or every library when `None`.
    ///
    /// # Errors
    ///
    /// An unknown library id is reported without creating a task.
    #[instrument(skip(self))]
    pub async fn start_scan(&self, library_ids: Option<Vec<String>>) -> Result<TaskId> {
        if let Some(ids) = &library_ids {
            for id in ids {
                self.get_library(id).await?;
            }
        }

        let task_id = self
            .inner
            .engine
            .submit(TaskType::ScanLibraries, TaskArgs::ScanLibraries { library_ids })
            .await?;
        Ok(task_id)
    }

    pub async fn start_refresh(&self) -> Result<TaskId> {
        let task_id = self
            .inner
            .engine
            .submit(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
            .await?;
        Ok(task_id)
    }

    pub async fn get_task_status(&self, task_id: &TaskId) -> Result<BackgroundTask> {
        Ok(self.inner.engine.get_status(task_id).await?)
    }

    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        Ok(self.inner.engine.cancel(task_id).await?)
    }

    /// Most recent tasks first
    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: u32,
    ) -> Result<Vec<BackgroundTask>> {
        Ok(self.inner.engine.list(status, limit).await?)
    }

    /// Resolves with the task's terminal snapshot
    pub async fn wait_for_task(&self, task_id: &TaskId) -> Result<BackgroundTask> {
        Ok(self.inner.engine.wait(task_id).await?)
    }

    // ------------------------------------------------------------------
    // Libraries
    // ------------------------------------------------------------------

    /// Creates a library over an existing directory.
    #[instrument(skip(self, description))]
    pub async fn create_library(
        &self,
        library_type: LibraryType,
        directory_path: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Library> {
        let mut library = Library::new(library_type, directory_path.trim(), title.trim());
        library.description = description;
        library.validate()?;
        require_directory(&library.directory_path)?;

        self.inner.libraries.insert(&library).await?;
        info!(library_id = %library.id, "Library created");
        self.emit(LibraryEvent::LibraryCreated {
            library_id: library.id.clone(),
            name: library.title.clone(),
        });
        Ok(library)
    }

    pub async fn get_library(&self, library_id: &str) -> Result<Library> {
        self.inner
            .libraries
            .find_by_id(library_id)
            .await?
            .ok_or_else(|| LibraryError::not_found("Library", library_id).into())
    }

    pub async fn list_libraries(&self) -> Result<Vec<Library>> {
        Ok(self.inner.libraries.find_all().await?)
    }

    /// Replaces the stored library with `library`.
    pub async fn update_library(&self, mut library: Library) -> Result<Library> {
        let current = self.get_library(&library.id).await?;
        library.validate()?;
        if library.directory_path != current.directory_path {
            require_directory(&library.directory_path)?;
        }

        library.created_at = current.created_at;
        library.updated_at = now_timestamp();
        self.inner.libraries.update(&library).await?;
        Ok(library)
    }

    /// Deletes the library and its file records. Movies and shows stay in
    /// the catalog without a library.
    #[instrument(skip(self))]
    pub async fn delete_library(&self, library_id: &str) -> Result<()> {
        if !self.inner.libraries.delete(library_id).await? {
            return Err(LibraryError::not_found("Library", library_id).into());
        }
        info!(library_id, "Library deleted");
        self.emit(LibraryEvent::LibraryDeleted {
            library_id: library_id.to_string(),
        });
        Ok(())
    }

    /// Deletes the movie and submits cleanup for its people.
    pub async fn delete_movie(&self, movie_id: i64) -> Result<TaskId> {
        Ok(self
            .inner
            .synchronizer
            .delete_movie(movie_id, &self.inner.engine)
            .await?)
    }

    /// Deletes the show and submits cleanup for its people.
    pub async fn delete_show(&self, show_id: i64) -> Result<TaskId> {
        Ok(self
            .inner
            .synchronizer
            .delete_show(show_id, &self.inner.engine)
            .await?)
    }

    /// Library-owned files in the format peers read from `/metadata/files`
    pub async fn local_file_catalog(&self) -> Result<Vec<RemoteFileRecord>> {
        Ok(self.inner.federation.local_file_catalog().await?)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub async fn validate_node(&self, url: &str, api_key: Option<&str>) -> Result<ValidationReport> {
        Ok(self.inner.federation.validate(url, api_key).await?)
    }

    pub async fn connect_node(
        &self,
        name: &str,
        url: &str,
        destination_api_key: Option<String>,
        own_api_key: Option<String>,
    ) -> Result<NodeInfo> {
        Ok(self
            .inner
            .federation
            .connect(name, url, destination_api_key, own_api_key)
            .await?)
    }

    pub async fn register_incoming_node(
        &self,
        name: &str,
        url: &str,
        api_key: Option<String>,
    ) -> Result<NodeInfo> {
        Ok(self
            .inner
            .federation
            .register_incoming(name, url, api_key)
            .await?)
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.inner.federation.list_nodes().await?)
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeInfo> {
        Ok(self.inner.federation.get_node(node_id).await?)
    }

    pub async fn enable_node(&self, node_id: &str) -> Result<NodeInfo> {
        Ok(self.inner.federation.enable_node(node_id).await?)
    }

    pub async fn disable_node(&self, node_id: &str) -> Result<NodeInfo> {
        Ok(self.inner.federation.disable_node(node_id).await?)
    }

    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        Ok(self.inner.federation.delete_node(node_id).await?)
    }

    pub async fn fetch_remote_catalog(&self, node_id: &str) -> Result<CatalogSyncSummary> {
        Ok(self.inner.federation.fetch_remote_catalog(node_id).await?)
    }

    pub async fn start_download(
        &self,
        node_id: &str,
        remote_path: &str,
        library_id: &str,
    ) -> Result<TaskId> {
        Ok(self
            .inner
            .federation
            .start_download(&self.inner.engine, node_id, remote_path, library_id)
            .await?)
    }

    fn emit(&self, event: LibraryEvent) {
        self.inner.event_bus.emit(CoreEvent::Library(event)).ok();
    }
}

fn require_directory(path: &str) -> Result<()> {
    if Path::new(path).is_dir() {
        Ok(())
    } else {
        Err(LibraryError::invalid("directory_path", format!("'{}' is not a directory", path)).into())
    }
}
