use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task {task_id} not found")]
    NotFound { task_id: String },

    #[error("Task {task_id} is still active")]
    AlreadyRunning { task_id: String },

    #[error("Task {task_id} is not active")]
    NotActive { task_id: String },

    #[error("Invalid task arguments: {0}")]
    InvalidArgs(String),

    #[error("No executor registered for task type {0}")]
    NoExecutor(String),

    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Task cancelled")]
    Cancelled,

    #[error("{0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    /// Wraps an executor failure, keeping only its message.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }

    pub fn not_found(task_id: impl ToString) -> Self {
        Self::NotFound {
            task_id: task_id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
