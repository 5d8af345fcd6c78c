use thiserror::Error;

#[derive(Error, Debug)]
pub enum FederationError {
    /// Peer unreachable, timed out or answered with a non-2xx status
    #[error("Cannot reach node at {url}: {reason}")]
    Connectivity { url: String, reason: String },

    /// Peer answered with something that is not the federation protocol
    #[error("Unexpected response from node at {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("Invalid node URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("A node with URL {url} is already registered")]
    DuplicateNode { url: String },

    #[error("Node {0} is disabled")]
    NodeDisabled(String),

    #[error("Invalid node state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Destination file already exists: {0}")]
    DestinationExists(String),

    #[error("Download incomplete: expected {expected} bytes, received {received}")]
    IncompleteDownload { expected: u64, received: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Task error: {0}")]
    Task(#[from] core_tasks::TaskError),

    #[error("Download cancelled")]
    Cancelled,
}

impl FederationError {
    pub fn connectivity(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connectivity {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, FederationError::Connectivity { .. })
    }
}

impl From<FederationError> for core_tasks::TaskError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::Cancelled
            | FederationError::Task(core_tasks::TaskError::Cancelled) => {
                core_tasks::TaskError::Cancelled
            }
            other => core_tasks::TaskError::execution(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FederationError>;
