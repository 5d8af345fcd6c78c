use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Task error: {0}")]
    Task(#[from] core_tasks::TaskError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Federation error: {0}")]
    Federation(#[from] core_federation::FederationError),
}

impl CoreError {
    /// Whether the call referenced an id with no record
    pub fn is_not_found(&self) -> bool {
        use core_federation::FederationError;
        use core_library::LibraryError;
        use core_sync::SyncError;
        use core_tasks::TaskError;

        matches!(
            self,
            CoreError::Library(LibraryError::NotFound { .. })
                | CoreError::Task(TaskError::NotFound { .. })
                | CoreError::Sync(SyncError::Library(LibraryError::NotFound { .. }))
                | CoreError::Federation(
                    FederationError::NodeNotFound(_)
                        | FederationError::LibraryNotFound(_)
                        | FederationError::Library(LibraryError::NotFound { .. })
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
