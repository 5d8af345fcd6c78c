//! # Background Task State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! Terminal states never transition again. A finished task id may be
//! submitted again, which replaces the record with a fresh `Pending` one.

use crate::args::TaskArgs;
use crate::error::{Result, TaskError};
use crate::payload::TaskPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TaskError::InvalidTaskId(e.to_string()))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

// ============================================================================
// Status and Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    /// Checks whether moving to `to` is allowed
    pub fn validate_transition(&self, to: TaskStatus) -> Result<()> {
        let valid = matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        );

        if !valid {
            return Err(TaskError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self, to),
            });
        }
        Ok(())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "Running" => Ok(TaskStatus::Running),
            "Completed" => Ok(TaskStatus::Completed),
            "Failed" => Ok(TaskStatus::Failed),
            "Cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(TaskError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    ScanLibraries,
    RefreshMetadata,
    PersonCleanup,
    NodeDownload,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ScanLibraries => "ScanLibraries",
            TaskType::RefreshMetadata => "RefreshMetadata",
            TaskType::PersonCleanup => "PersonCleanup",
            TaskType::NodeDownload => "NodeDownload",
        }
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ScanLibraries" => Ok(TaskType::ScanLibraries),
            "RefreshMetadata" => Ok(TaskType::RefreshMetadata),
            "PersonCleanup" => Ok(TaskType::PersonCleanup),
            "NodeDownload" => Ok(TaskType::NodeDownload),
            _ => Err(TaskError::InvalidArgs(format!("unknown task type '{}'", s))),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Task Snapshot
// ============================================================================

/// Snapshot of one task execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Percent complete, `0.0..=100.0`
    pub progress: f64,
    pub args: TaskArgs,
    pub payload: TaskPayload,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl BackgroundTask {
    pub fn new(id: TaskId, args: TaskArgs) -> Self {
        Self {
            id,
            task_type: args.task_type(),
            status: TaskStatus::Pending,
            progress: 0.0,
            args,
            payload: TaskPayload::None,
            last_error: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Moves to `status`, stamping start and completion times.
    pub fn transition(&mut self, status: TaskStatus) -> Result<()> {
        self.status.validate_transition(status)?;
        self.status = status;

        let now = current_timestamp();
        if status == TaskStatus::Running {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        if status == TaskStatus::Completed {
            self.progress = 100.0;
        }
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start) as u64),
            _ => None,
        }
    }
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
