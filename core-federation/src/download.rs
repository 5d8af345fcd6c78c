//! Remote file download executor
//!
//! Streams one file from a peer into a library directory. The destination
//! is claimed with an empty create-new placeholder, the content goes to a
//! sibling `.part` file that is renamed over the placeholder once the size
//! checks out. Both are removed on any failure or cancellation, so a
//! non-empty file at the destination is always complete.

use crate::client::NodeClient;
use crate::error::{FederationError, Result};
use crate::service::FederationRepositories;
use async_trait::async_trait;
use core_library::models::{FileMetadata, Library, NodeInfo};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::strip_path;
use core_tasks::{DownloadPayload, TaskArgs, TaskContext, TaskError, TaskExecutor, TaskPayload, TaskType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

const CHUNK_SIZE: usize = 64 * 1024;

pub struct DownloadExecutor {
    client: NodeClient,
    repos: FederationRepositories,
    event_bus: Option<Arc<EventBus>>,
}

impl DownloadExecutor {
    pub fn new(
        client: NodeClient,
        repos: FederationRepositories,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            client,
            repos,
            event_bus,
        }
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id()))]
    async fn download(
        &self,
        ctx: &TaskContext,
        node_id: &str,
        remote_path: &str,
        library_id: &str,
    ) -> Result<()> {
        let node = self
            .repos
            .nodes
            .find_by_id(node_id)
            .await?
            .ok_or_else(|| FederationError::NodeNotFound(node_id.to_string()))?;
        if !node.is_enabled {
            return Err(FederationError::NodeDisabled(node.id));
        }
        let library = self
            .repos
            .libraries
            .find_by_id(library_id)
            .await?
            .ok_or_else(|| FederationError::LibraryNotFound(library_id.to_string()))?;

        let destination = destination_path(&library, remote_path)?;
        let mut payload =
            DownloadPayload::new(&node.id, remote_path, destination.to_string_lossy());
        ctx.set_payload(TaskPayload::Download(payload.clone())).await;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
            .await
        {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FederationError::DestinationExists(
                    destination.display().to_string(),
                ))
            }
            Err(e) => return Err(FederationError::io(&destination, e)),
        };

        let part = part_path(&destination);
        let result = self
            .fetch_into(ctx, &node, remote_path, &part, &destination, &mut payload)
            .await;
        if let Err(e) = result {
            remove_partial(&part).await;
            remove_partial(&destination).await;
            return Err(e);
        }

        info!(
            file = strip_path(&payload.destination_path),
            bytes = payload.downloaded_bytes,
            "Download finished"
        );
        self.record_file(&node, &library, remote_path, &destination, payload.downloaded_bytes)
            .await;
        Ok(())
    }

    /// Streams into `part` under the download timeout, then moves it onto
    /// `destination`.
    async fn fetch_into(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        remote_path: &str,
        part: &Path,
        destination: &Path,
        payload: &mut DownloadPayload,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(part)
            .await
            .map_err(|e| FederationError::io(part, e))?;

        tokio::time::timeout(
            self.client.config().download_timeout,
            self.transfer(ctx, node, remote_path, file, part, payload),
        )
        .await
        .unwrap_or_else(|_| {
            Err(FederationError::connectivity(
                &node.url,
                "download timed out",
            ))
        })?;

        tokio::fs::rename(part, destination)
            .await
            .map_err(|e| FederationError::io(destination, e))
    }

    async fn transfer(
        &self,
        ctx: &TaskContext,
        node: &NodeInfo,
        remote_path: &str,
        mut file: File,
        part: &Path,
        payload: &mut DownloadPayload,
    ) -> Result<()> {
        let token = ctx.cancellation_token();
        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FederationError::Cancelled),
            stream = self.client.open_stream(&node.url, node.api_key.as_deref(), remote_path) => stream?,
        };

        payload.total_bytes = stream.content_length;
        publish(ctx, payload).await;

        let interval = self.client.config().download_progress_interval_bytes;
        let mut unreported = 0u64;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(FederationError::Cancelled),
                read = stream.reader.read(&mut buffer) => read,
            };
            let n = read.map_err(|e| FederationError::connectivity(&node.url, e))?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])
                .await
                .map_err(|e| FederationError::io(part, e))?;
            payload.downloaded_bytes += n as u64;
            unreported += n as u64;

            if unreported >= interval {
                unreported = 0;
                publish(ctx, payload).await;
            }
        }

        file.flush()
            .await
            .map_err(|e| FederationError::io(part, e))?;
        file.sync_all()
            .await
            .map_err(|e| FederationError::io(part, e))?;

        if let Some(expected) = payload.total_bytes {
            if expected != payload.downloaded_bytes {
                return Err(FederationError::IncompleteDownload {
                    expected,
                    received: payload.downloaded_bytes,
                });
            }
        }

        publish(ctx, payload).await;
        Ok(())
    }

    /// Links the downloaded file when the peer's catalog describes it.
    async fn record_file(
        &self,
        node: &NodeInfo,
        library: &Library,
        remote_path: &str,
        destination: &Path,
        size: u64,
    ) {
        let remote = match self.repos.files.find_by_node_path(&node.id, remote_path).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                debug!(remote_path, "Remote file not in fetched catalog, no record created");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to look up remote file record");
                return;
            }
        };

        let mut file = FileMetadata::local(
            &library.id,
            remote.media_type,
            remote.media_provider_id,
            destination.to_string_lossy(),
        )
        .with_file_size(size as i64);
        file.season_number = remote.season_number;
        file.episode_number = remote.episode_number;
        file.content_hash = remote.content_hash;

        match self.repos.files.insert(&file).await {
            Ok(true) => {
                if let Some(bus) = &self.event_bus {
                    bus.emit(CoreEvent::Library(LibraryEvent::FileAdded {
                        file_id: file.id.clone(),
                        file_path: file.file_path.clone(),
                    }))
                    .ok();
                }
            }
            Ok(false) => debug!("Downloaded file already recorded"),
            Err(e) => warn!(error = %e, "Failed to record downloaded file"),
        }
    }
}

#[async_trait]
impl TaskExecutor for DownloadExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::NodeDownload
    }

    async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> core_tasks::Result<()> {
        match args {
            TaskArgs::NodeDownload {
                node_id,
                remote_path,
                library_id,
            } => {
                self.download(ctx, &node_id, &remote_path, &library_id)
                    .await?;
                Ok(())
            }
            other => Err(TaskError::InvalidArgs(format!(
                "download executor cannot run {} arguments",
                other.task_type()
            ))),
        }
    }
}

async fn publish(ctx: &TaskContext, payload: &DownloadPayload) {
    ctx.set_payload(TaskPayload::Download(payload.clone()))
        .await;
    if let Some(percent) = payload.percent() {
        ctx.report_progress(percent).await;
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "Partial download removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove partial download"),
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Library root joined with the remote file name.
fn destination_path(library: &Library, remote_path: &str) -> Result<PathBuf> {
    let name = remote_path
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| FederationError::InvalidInput {
            field: "remote_path".to_string(),
            message: format!("'{}' does not name a file", remote_path),
        })?;
    Ok(Path::new(&library.directory_path).join(name))
}
