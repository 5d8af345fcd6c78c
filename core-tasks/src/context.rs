//! Execution context handed to a running executor
//!
//! The context owns the live snapshot of its task. Every update replaces the
//! snapshot atomically, is written to the repository when one is configured,
//! and progress changes are published on the event bus.

use crate::error::{Result, TaskError};
use crate::payload::TaskPayload;
use crate::repository::TaskRepository;
use crate::task::{BackgroundTask, TaskId, TaskStatus};
use core_runtime::events::{CoreEvent, EventBus, TaskEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    snapshot: Arc<watch::Sender<BackgroundTask>>,
    cancellation: CancellationToken,
    repository: Option<Arc<dyn TaskRepository>>,
    event_bus: Option<Arc<EventBus>>,
}

impl TaskContext {
    pub(crate) fn new(
        snapshot: Arc<watch::Sender<BackgroundTask>>,
        cancellation: CancellationToken,
        repository: Option<Arc<dyn TaskRepository>>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let task_id = snapshot.borrow().id;
        Self {
            task_id,
            snapshot,
            cancellation,
            repository,
            event_bus,
        }
    }

    /// Standalone context, mainly for driving an executor directly in tests
    pub fn detached(task: BackgroundTask) -> Self {
        let (sender, _) = watch::channel(task);
        Self::new(Arc::new(sender), CancellationToken::new(), None, None)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// True when `snapshot` is the channel this context publishes to
    pub(crate) fn owns(&self, snapshot: &Arc<watch::Sender<BackgroundTask>>) -> bool {
        Arc::ptr_eq(&self.snapshot, snapshot)
    }

    /// Current snapshot of the task
    pub fn snapshot(&self) -> BackgroundTask {
        self.snapshot.borrow().clone()
    }

    pub fn progress(&self) -> f64 {
        self.snapshot.borrow().progress
    }

    /// Reports percent complete.
    ///
    /// Values are clamped to `0..=100`; a value below the current progress
    /// is ignored so the reported sequence never decreases.
    pub async fn report_progress(&self, percent: f64) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };

        let mut changed = false;
        self.snapshot.send_if_modified(|task| {
            if percent > task.progress {
                task.progress = percent;
                changed = true;
            }
            changed
        });

        if !changed {
            debug!(task_id = %self.task_id, percent, "Ignoring non-increasing progress");
            return;
        }

        self.persist().await;
        self.emit(TaskEvent::Progress {
            task_id: self.task_id.to_string(),
            progress: percent,
        });
    }

    /// Replaces the payload snapshot.
    pub async fn set_payload(&self, payload: TaskPayload) {
        self.snapshot.send_modify(|task| task.payload = payload);
        self.persist().await;
    }

    /// Moves the task to `status`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the move is not allowed.
    pub async fn report_status(&self, status: TaskStatus) -> Result<()> {
        let mut outcome = Ok(());
        self.snapshot.send_if_modified(|task| {
            outcome = task.transition(status);
            outcome.is_ok()
        });
        outcome?;

        self.persist().await;
        Ok(())
    }

    /// Records a non-fatal error; the latest one wins.
    pub async fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.snapshot
            .send_modify(|task| task.last_error = Some(message));
        self.persist().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns `Err(TaskError::Cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Token to await cancellation alongside long operations
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Writes the final state to the repository before publishing it, so
    /// waiters observe a persisted snapshot.
    pub(crate) async fn finish(&self, status: TaskStatus, error: Option<String>) -> Result<()> {
        let mut task = self.snapshot();
        task.transition(status)?;
        if status == TaskStatus::Cancelled {
            task.last_error = None;
        } else if let Some(error) = error {
            task.last_error = Some(error);
        }

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.upsert(&task).await {
                warn!(task_id = %self.task_id, error = %e, "Failed to persist final task state");
            }
        }
        self.snapshot.send_replace(task);
        Ok(())
    }

    pub(crate) async fn persist(&self) {
        if let Some(repository) = &self.repository {
            let task = self.snapshot();
            if let Err(e) = repository.upsert(&task).await {
                warn!(task_id = %self.task_id, error = %e, "Failed to persist task snapshot");
            }
        }
    }

    pub(crate) fn emit(&self, event: TaskEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Task(event)).ok();
        }
    }
}
