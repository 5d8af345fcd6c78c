//! # Node Federation Service
//!
//! Registers peers in both directions, keeps a local copy of each peer's
//! file catalog and submits file downloads.
//!
//! ## Connect
//!
//! 1. Normalize the URL and reject it when a node already uses it
//! 2. Probe the peer's health endpoint
//! 3. Register this node with the peer so trust exists both ways
//! 4. Persist the peer locally
//!
//! Nothing is stored when step 2 or 3 fails.

use crate::client::NodeClient;
use crate::error::{FederationError, Result};
use crate::protocol::{normalize_url, RegisterNodeRequest, RemoteFileRecord};
use crate::state::NodeState;
use core_library::models::{now_timestamp, FileMetadata, NodeInfo};
use core_library::repositories::{
    FileRepository, LibraryRepository, NodeRepository, SqliteFileRepository,
    SqliteLibraryRepository, SqliteNodeRepository,
};
use core_runtime::config::NodeIdentity;
use core_runtime::events::{CoreEvent, EventBus, NodeEvent};
use core_tasks::{TaskArgs, TaskEngine, TaskId, TaskType};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Repositories the federation service reads and writes
#[derive(Clone)]
pub struct FederationRepositories {
    pub nodes: Arc<dyn NodeRepository>,
    pub files: Arc<dyn FileRepository>,
    pub libraries: Arc<dyn LibraryRepository>,
}

impl FederationRepositories {
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            nodes: Arc::new(SqliteNodeRepository::new(pool.clone())),
            files: Arc::new(SqliteFileRepository::new(pool.clone())),
            libraries: Arc::new(SqliteLibraryRepository::new(pool)),
        }
    }
}

/// Outcome of a health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub reachable: bool,
    pub message: String,
    pub node_name: Option<String>,
}

/// Changes applied by one catalog fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSyncSummary {
    pub added: u64,
    pub removed: u64,
    pub unchanged: u64,
}

type FileKey = (i64, String, Option<i32>, Option<i32>);

fn file_key(file: &FileMetadata) -> FileKey {
    let (id, path, season, episode) = file.identity();
    (id, path.to_string(), season, episode)
}

pub struct FederationService {
    client: NodeClient,
    repos: FederationRepositories,
    identity: NodeIdentity,
    event_bus: Option<Arc<EventBus>>,
}

impl FederationService {
    pub fn new(
        client: NodeClient,
        repos: FederationRepositories,
        identity: NodeIdentity,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            client,
            repos,
            identity,
            event_bus,
        }
    }

    /// Probes `url` without touching any state.
    ///
    /// # Errors
    ///
    /// Only a malformed URL is an error; an unreachable or misbehaving peer
    /// is reported through the returned [`ValidationReport`].
    #[instrument(skip(self, api_key))]
    pub async fn validate(&self, url: &str, api_key: Option<&str>) -> Result<ValidationReport> {
        let url = normalize_url(url)?;
        match self.client.health(&url, api_key).await {
            Ok(health) => Ok(ValidationReport {
                reachable: true,
                message: format!("Node is reachable (status: {})", health.status),
                node_name: health.name,
            }),
            Err(e) => {
                debug!(url = %url, error = %e, "Node validation failed");
                Ok(ValidationReport {
                    reachable: false,
                    message: e.to_string(),
                    node_name: None,
                })
            }
        }
    }

    /// Validates the peer, registers this node with it and stores it.
    ///
    /// `destination_api_key` authenticates calls to the peer; `own_api_key`
    /// is what the peer should present when calling back, defaulting to the
    /// configured identity key.
    #[instrument(skip(self, destination_api_key, own_api_key))]
    pub async fn connect(
        &self,
        name: &str,
        url: &str,
        destination_api_key: Option<String>,
        own_api_key: Option<String>,
    ) -> Result<NodeInfo> {
        require_name(name)?;
        let url = normalize_url(url)?;
        if self.repos.nodes.find_by_url(&url).await?.is_some() {
            return Err(FederationError::DuplicateNode { url });
        }

        let state = NodeState::Unknown.transition(NodeState::Validating)?;
        if let Err(e) = self.client.health(&url, destination_api_key.as_deref()).await {
            let state = state.transition(NodeState::Unknown)?;
            warn!(url = %url, %state, error = %e, "Peer failed validation");
            return Err(e);
        }

        let handshake = RegisterNodeRequest {
            name: self.identity.name.clone(),
            url: self.identity.url.clone(),
            api_key: own_api_key.or_else(|| self.identity.api_key.clone()),
        };
        self.client
            .register(&url, destination_api_key.as_deref(), &handshake)
            .await?;
        let state = state.transition(NodeState::Registered)?;

        let node = NodeInfo::new(name.trim(), url, destination_api_key);
        self.repos.nodes.insert(&node).await?;
        let state = state.transition(NodeState::of(&node))?;

        info!(node_id = %node.id, url = %node.url, %state, "Node connected");
        self.emit(NodeEvent::Registered {
            node_id: node.id.clone(),
            name: node.name.clone(),
        });
        Ok(node)
    }

    /// Handles a peer's registration handshake.
    ///
    /// A known URL refreshes `last_validated_at` and, when given, the api
    /// key; an unknown URL creates the node.
    #[instrument(skip(self, api_key))]
    pub async fn register_incoming(
        &self,
        name: &str,
        url: &str,
        api_key: Option<String>,
    ) -> Result<NodeInfo> {
        let url = normalize_url(url)?;
        let now = now_timestamp();

        let node = match self.repos.nodes.find_by_url(&url).await? {
            Some(mut node) => {
                node.last_validated_at = Some(now);
                node.updated_at = now;
                if api_key.is_some() {
                    node.api_key = api_key;
                }
                self.repos.nodes.update(&node).await?;
                debug!(node_id = %node.id, "Known node re-registered");
                node
            }
            None => {
                require_name(name)?;
                let node = NodeInfo::new(name.trim(), url, api_key);
                self.repos.nodes.insert(&node).await?;
                info!(node_id = %node.id, url = %node.url, "Incoming node registered");
                node
            }
        };

        self.emit(NodeEvent::IncomingRegistered {
            node_id: node.id.clone(),
            name: node.name.clone(),
        });
        Ok(node)
    }

    /// Pulls the peer's file catalog and reconciles the node-owned records.
    #[instrument(skip(self))]
    pub async fn fetch_remote_catalog(&self, node_id: &str) -> Result<CatalogSyncSummary> {
        let mut node = self.get_node(node_id).await?;
        if !node.is_enabled {
            return Err(FederationError::NodeDisabled(node.id));
        }

        let records = self
            .client
            .list_files(&node.url, node.api_key.as_deref())
            .await?;

        let mut remote: HashMap<FileKey, FileMetadata> = HashMap::with_capacity(records.len());
        for record in records {
            let file = record.into_node_file(&node.id);
            if let Err(e) = file.validate() {
                warn!(node_id = %node.id, error = %e, "Ignoring invalid remote file record");
                continue;
            }
            remote.entry(file_key(&file)).or_insert(file);
        }

        let existing = self.repos.files.find_by_node(&node.id).await?;
        let known: HashSet<FileKey> = existing.iter().map(file_key).collect();

        let mut summary = CatalogSyncSummary::default();
        for file in &existing {
            if remote.contains_key(&file_key(file)) {
                summary.unchanged += 1;
            } else if self.repos.files.delete(&file.id).await? {
                summary.removed += 1;
            }
        }
        for (key, file) in &remote {
            if !known.contains(key) && self.repos.files.insert(file).await? {
                summary.added += 1;
            }
        }

        let now = now_timestamp();
        node.last_validated_at = Some(now);
        node.updated_at = now;
        self.repos.nodes.update(&node).await?;

        info!(
            node_id = %node.id,
            added = summary.added,
            removed = summary.removed,
            unchanged = summary.unchanged,
            "Remote catalog fetched"
        );
        self.emit(NodeEvent::CatalogFetched {
            node_id: node.id,
            added: summary.added,
            removed: summary.removed,
            unchanged: summary.unchanged,
        });
        Ok(summary)
    }

    /// Checks the node and library, then submits a download task.
    ///
    /// # Errors
    ///
    /// Unknown or disabled nodes and unknown libraries are reported without
    /// creating a task.
    #[instrument(skip(self, engine))]
    pub async fn start_download(
        &self,
        engine: &TaskEngine,
        node_id: &str,
        remote_path: &str,
        library_id: &str,
    ) -> Result<TaskId> {
        if remote_path.trim().is_empty() {
            return Err(FederationError::InvalidInput {
                field: "remote_path".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        let node = self.get_node(node_id).await?;
        if !node.is_enabled {
            return Err(FederationError::NodeDisabled(node.id));
        }
        if self.repos.libraries.find_by_id(library_id).await?.is_none() {
            return Err(FederationError::LibraryNotFound(library_id.to_string()));
        }

        let task_id = engine
            .submit(
                TaskType::NodeDownload,
                TaskArgs::NodeDownload {
                    node_id: node.id,
                    remote_path: remote_path.to_string(),
                    library_id: library_id.to_string(),
                },
            )
            .await?;
        Ok(task_id)
    }

    /// Library-owned file records in wire format
    pub async fn local_file_catalog(&self) -> Result<Vec<RemoteFileRecord>> {
        let files = self.repos.files.find_local().await?;
        Ok(files.iter().map(RemoteFileRecord::from).collect())
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.repos.nodes.find_all().await?)
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeInfo> {
        self.repos
            .nodes
            .find_by_id(node_id)
            .await?
            .ok_or_else(|| FederationError::NodeNotFound(node_id.to_string()))
    }

    pub async fn enable_node(&self, node_id: &str) -> Result<NodeInfo> {
        self.set_state(node_id, NodeState::Enabled).await
    }

    pub async fn disable_node(&self, node_id: &str) -> Result<NodeInfo> {
        self.set_state(node_id, NodeState::Disabled).await
    }

    /// Deletes the node and the file records fetched from it
    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        if !self.repos.nodes.delete(node_id).await? {
            return Err(FederationError::NodeNotFound(node_id.to_string()));
        }
        info!(node_id, "Node removed");
        self.emit(NodeEvent::Removed {
            node_id: node_id.to_string(),
        });
        Ok(())
    }

    async fn set_state(&self, node_id: &str, target: NodeState) -> Result<NodeInfo> {
        let mut node = self.get_node(node_id).await?;
        let current = NodeState::of(&node);
        if current == target {
            return Ok(node);
        }
        current.validate_transition(target)?;

        node.is_enabled = target == NodeState::Enabled;
        node.updated_at = now_timestamp();
        self.repos.nodes.update(&node).await?;

        info!(node_id, state = %target, "Node state changed");
        let node_id = node.id.clone();
        self.emit(match target {
            NodeState::Enabled => NodeEvent::Enabled { node_id },
            _ => NodeEvent::Disabled { node_id },
        });
        Ok(node)
    }

    fn emit(&self, event: NodeEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Node(event)).ok();
        }
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FederationError::InvalidInput {
            field: "name".to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    Ok(())
}
