//! # Background Task Engine
//!
//! Generic "run this unit of work, track progress, allow cancellation"
//! primitive used by the synchronizer and the federation service.
//!
//! ## Components
//!
//! - **TaskEngine**: executor registry, submission, status, cancellation
//! - **TaskContext**: progress, payload and status reporting for executors
//! - **TaskRepository**: SQLite persistence of task snapshots
//! - **TaskPayload**: type-specific progress snapshots

pub mod args;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod payload;
pub mod repository;
pub mod task;

pub use args::TaskArgs;
pub use context::TaskContext;
pub use engine::{TaskEngine, TaskEngineBuilder};
pub use error::{Result, TaskError};
pub use executor::TaskExecutor;
pub use payload::{DownloadPayload, PersonCleanupPayload, SyncPayload, TaskPayload};
pub use repository::{SqliteTaskRepository, TaskRepository};
pub use task::{BackgroundTask, TaskId, TaskStatus, TaskType};
