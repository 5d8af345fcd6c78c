use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Catalog error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Task error: {0}")]
    Task(#[from] core_tasks::TaskError),

    #[error("Library directory {path} is unreachable: {reason}")]
    LibraryUnreachable { path: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background scan worker failed: {0}")]
    Worker(String),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Errors that abort the whole run instead of skipping one item.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Metadata(e) => e.is_fatal(),
            SyncError::Cancelled => true,
            _ => false,
        }
    }
}

impl From<SyncError> for core_tasks::TaskError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Cancelled | SyncError::Task(core_tasks::TaskError::Cancelled) => {
                core_tasks::TaskError::Cancelled
            }
            other => core_tasks::TaskError::execution(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
