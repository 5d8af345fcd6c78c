//! # Task Engine
//!
//! Runs submitted tasks on their own tokio task, one per submission, and
//! tracks their snapshots.
//!
//! ## Overview
//!
//! - Executors are registered once, keyed by [`TaskType`]
//! - `submit` validates arguments, records a `Pending` snapshot and spawns
//! - Cancellation is cooperative through a per-task `CancellationToken`
//! - Panics inside an executor fail the task instead of the process
//! - With a repository configured, settled tasks leave the in-memory
//!   registry and are served from persisted history
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = TaskEngine::builder()
//!     .with_executor(Arc::new(ScanExecutor::new(synchronizer)))
//!     .with_repository(Arc::new(SqliteTaskRepository::new(pool)))
//!     .with_event_bus(event_bus)
//!     .build();
//!
//! let task_id = engine
//!     .submit(TaskType::ScanLibraries, TaskArgs::ScanLibraries { library_ids: None })
//!     .await?;
//! let finished = engine.wait(&task_id).await?;
//! ```

use crate::args::TaskArgs;
use crate::context::TaskContext;
use crate::error::{Result, TaskError};
use crate::executor::TaskExecutor;
use crate::repository::TaskRepository;
use crate::task::{BackgroundTask, TaskId, TaskStatus, TaskType};
use core_runtime::events::{EventBus, TaskEvent};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const INTERRUPTED_MESSAGE: &str = "Interrupted by shutdown";

struct TaskHandle {
    snapshot: Arc<watch::Sender<BackgroundTask>>,
    cancellation: CancellationToken,
}

type Registry = Arc<RwLock<HashMap<TaskId, TaskHandle>>>;

#[derive(Default)]
pub struct TaskEngineBuilder {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
    repository: Option<Arc<dyn TaskRepository>>,
    event_bus: Option<Arc<EventBus>>,
}

impl TaskEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor for its task type, replacing any previous one
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executors.insert(executor.task_type(), executor);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn TaskRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> TaskEngine {
        TaskEngine {
            executors: self.executors,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            repository: self.repository,
            event_bus: self.event_bus,
        }
    }
}

pub struct TaskEngine {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
    tasks: Registry,
    repository: Option<Arc<dyn TaskRepository>>,
    event_bus: Option<Arc<EventBus>>,
}

impl TaskEngine {
    pub fn builder() -> TaskEngineBuilder {
        TaskEngineBuilder::new()
    }

    pub fn has_executor(&self, task_type: TaskType) -> bool {
        self.executors.contains_key(&task_type)
    }

    /// Submits a task under a fresh id and starts it.
    ///
    /// # Errors
    ///
    /// - `InvalidArgs` when `args` belong to another task type
    /// - `NoExecutor` when nothing is registered for `task_type`
    pub async fn submit(&self, task_type: TaskType, args: TaskArgs) -> Result<TaskId> {
        self.submit_with_id(TaskId::new(), task_type, args).await
    }

    /// Submits a task under a caller-chosen id.
    ///
    /// A finished task with the same id is replaced.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit), plus `AlreadyRunning` while a task
    /// with that id is still pending or running.
    #[instrument(skip(self, args), fields(task_id = %task_id, task_type = %task_type))]
    pub async fn submit_with_id(
        &self,
        task_id: TaskId,
        task_type: TaskType,
        args: TaskArgs,
    ) -> Result<TaskId> {
        if args.task_type() != task_type {
            return Err(TaskError::InvalidArgs(format!(
                "arguments for {} submitted as {}",
                args.task_type(),
                task_type
            )));
        }
        let executor = self
            .executors
            .get(&task_type)
            .cloned()
            .ok_or_else(|| TaskError::NoExecutor(task_type.to_string()))?;

        let ctx = {
            let mut tasks = self.tasks.write().await;
            if let Some(existing) = tasks.get(&task_id) {
                if existing.snapshot.borrow().status.is_active() {
                    return Err(TaskError::AlreadyRunning {
                        task_id: task_id.to_string(),
                    });
                }
            }

            let (sender, _) = watch::channel(BackgroundTask::new(task_id, args.clone()));
            let snapshot = Arc::new(sender);
            let cancellation = CancellationToken::new();
            tasks.insert(
                task_id,
                TaskHandle {
                    snapshot: Arc::clone(&snapshot),
                    cancellation: cancellation.clone(),
                },
            );

            TaskContext::new(
                snapshot,
                cancellation,
                self.repository.clone(),
                self.event_bus.clone(),
            )
        };

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.upsert(&ctx.snapshot()).await {
                self.tasks.write().await.remove(&task_id);
                return Err(e);
            }
        }

        let registry = self.repository.as_ref().map(|_| Arc::clone(&self.tasks));
        tokio::spawn(run_task(ctx, executor, args, registry));
        info!("Task submitted");

        Ok(task_id)
    }

    /// Latest snapshot of a task, falling back to persisted history.
    pub async fn get_status(&self, task_id: &TaskId) -> Result<BackgroundTask> {
        if let Some(handle) = self.tasks.read().await.get(task_id) {
            return Ok(handle.snapshot.borrow().clone());
        }

        match &self.repository {
            Some(repository) => repository
                .find_by_id(task_id)
                .await?
                .ok_or_else(|| TaskError::not_found(task_id)),
            None => Err(TaskError::not_found(task_id)),
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// # Errors
    ///
    /// `NotActive` when the task already finished, `NotFound` for unknown ids.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn cancel(&self, task_id: &TaskId) -> Result<()> {
        if let Some(handle) = self.tasks.read().await.get(task_id) {
            if handle.snapshot.borrow().status.is_terminal() {
                return Err(TaskError::NotActive {
                    task_id: task_id.to_string(),
                });
            }
            handle.cancellation.cancel();
            info!("Cancellation requested");
            return Ok(());
        }

        match self.get_status(task_id).await {
            Ok(_) => Err(TaskError::NotActive {
                task_id: task_id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Recent tasks, newest first.
    pub async fn list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<BackgroundTask>> {
        if let Some(repository) = &self.repository {
            return repository.list(status, limit).await;
        }

        let mut tasks: Vec<BackgroundTask> = self
            .tasks
            .read()
            .await
            .values()
            .map(|handle| handle.snapshot.borrow().clone())
            .filter(|task| status.map_or(true, |s| task.status == s))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    /// Resolves once the task reaches a terminal state.
    pub async fn wait(&self, task_id: &TaskId) -> Result<BackgroundTask> {
        let receiver = self
            .tasks
            .read()
            .await
            .get(task_id)
            .map(|handle| handle.snapshot.subscribe());

        let Some(mut receiver) = receiver else {
            let task = self.get_status(task_id).await?;
            return if task.status.is_terminal() {
                Ok(task)
            } else {
                Err(TaskError::NotActive {
                    task_id: task_id.to_string(),
                })
            };
        };

        let task = receiver
            .wait_for(|task| task.status.is_terminal())
            .await
            .map_err(|_| TaskError::not_found(task_id))?
            .clone();
        Ok(task)
    }

    /// Number of tasks held in memory
    pub async fn tracked_tasks(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Drops a finished task from the in-memory registry.
    ///
    /// Returns `false` when the id was not tracked. Engines with a
    /// repository release settled tasks on their own.
    pub async fn remove(&self, task_id: &TaskId) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        match tasks.get(task_id) {
            Some(handle) if handle.snapshot.borrow().status.is_active() => {
                Err(TaskError::AlreadyRunning {
                    task_id: task_id.to_string(),
                })
            }
            Some(_) => {
                tasks.remove(task_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fails every task a previous process left pending or running.
    ///
    /// Returns the number of tasks marked failed.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };

        let live = self.tasks.read().await;
        let mut recovered = 0;
        for mut task in repository.find_active().await? {
            if live.contains_key(&task.id) {
                continue;
            }
            task.fail(INTERRUPTED_MESSAGE)?;
            repository.upsert(&task).await?;
            recovered += 1;
        }

        if recovered > 0 {
            warn!(recovered, "Marked interrupted tasks as failed");
        }
        Ok(recovered)
    }
}

#[instrument(skip_all, fields(task_id = %ctx.task_id(), task_type = %executor.task_type()))]
async fn run_task(
    ctx: TaskContext,
    executor: Arc<dyn TaskExecutor>,
    args: TaskArgs,
    registry: Option<Registry>,
) {
    execute(&ctx, executor, args).await;
    if let Some(registry) = registry {
        release(&registry, &ctx).await;
    }
}

async fn execute(ctx: &TaskContext, executor: Arc<dyn TaskExecutor>, args: TaskArgs) {
    let task_id = ctx.task_id().to_string();

    if ctx.is_cancelled() {
        settle(ctx, TaskStatus::Cancelled, None).await;
        return;
    }

    if let Err(e) = ctx.report_status(TaskStatus::Running).await {
        error!(error = %e, "Task could not start");
        return;
    }
    ctx.emit(TaskEvent::Started {
        task_id,
        task_type: executor.task_type().to_string(),
    });
    debug!("Task running");

    let outcome = AssertUnwindSafe(executor.execute(ctx, args))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => settle(ctx, TaskStatus::Completed, None).await,
        Ok(Err(TaskError::Cancelled)) => settle(ctx, TaskStatus::Cancelled, None).await,
        Ok(Err(e)) => settle(ctx, TaskStatus::Failed, Some(e.to_string())).await,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            settle(
                ctx,
                TaskStatus::Failed,
                Some(format!("Task panicked: {}", message)),
            )
            .await
        }
    }
}

/// Drops the registry entry of a settled task. A resubmission under the
/// same id owns a different channel and is left alone.
async fn release(registry: &Registry, ctx: &TaskContext) {
    if !ctx.snapshot().status.is_terminal() {
        return;
    }
    let task_id = ctx.task_id();
    let mut tasks = registry.write().await;
    if tasks
        .get(&task_id)
        .is_some_and(|handle| ctx.owns(&handle.snapshot))
    {
        tasks.remove(&task_id);
        debug!("Task released from registry");
    }
}

async fn settle(ctx: &TaskContext, status: TaskStatus, error: Option<String>) {
    let task_id = ctx.task_id().to_string();

    if let Err(e) = ctx.finish(status, error.clone()).await {
        error!(error = %e, "Could not record final task status");
        return;
    }

    match status {
        TaskStatus::Completed => {
            info!("Task completed");
            ctx.emit(TaskEvent::Progress {
                task_id: task_id.clone(),
                progress: 100.0,
            });
            ctx.emit(TaskEvent::Completed { task_id });
        }
        TaskStatus::Cancelled => {
            info!("Task cancelled");
            ctx.emit(TaskEvent::Cancelled { task_id });
        }
        _ => {
            let message = error.unwrap_or_default();
            error!(error = %message, "Task failed");
            ctx.emit(TaskEvent::Failed { task_id, message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PersonCleanupPayload, TaskPayload};
    use async_trait::async_trait;
    use core_runtime::events::CoreEvent;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Reports a few progress steps, then waits to be released or cancelled
    struct SteppingExecutor {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TaskExecutor for SteppingExecutor {
        fn task_type(&self) -> TaskType {
            TaskType::PersonCleanup
        }

        async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> Result<()> {
            let TaskArgs::PersonCleanup { person_ids } = args else {
                return Err(TaskError::InvalidArgs("expected person ids".to_string()));
            };

            ctx.report_progress(25.0).await;
            ctx.set_payload(TaskPayload::PersonCleanup(PersonCleanupPayload {
                people_checked: person_ids.len() as u64,
                ..Default::default()
            }))
            .await;

            let token = ctx.cancellation_token();
            tokio::select! {
                _ = self.release.notified() => {}
                _ = token.cancelled() => {}
            }
            ctx.check_cancelled()?;
            ctx.report_progress(75.0).await;
            Ok(())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        fn task_type(&self) -> TaskType {
            TaskType::RefreshMetadata
        }

        async fn execute(&self, ctx: &TaskContext, _args: TaskArgs) -> Result<()> {
            ctx.report_progress(10.0).await;
            Err(TaskError::execution("catalog unreachable"))
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl TaskExecutor for PanickingExecutor {
        fn task_type(&self) -> TaskType {
            TaskType::ScanLibraries
        }

        async fn execute(&self, _ctx: &TaskContext, _args: TaskArgs) -> Result<()> {
            panic!("executor bug");
        }
    }

    fn cleanup_args() -> TaskArgs {
        TaskArgs::PersonCleanup {
            person_ids: vec![1, 2, 3],
        }
    }

    fn engine(release: Arc<Notify>, bus: Arc<EventBus>) -> TaskEngine {
        TaskEngine::builder()
            .with_executor(Arc::new(SteppingExecutor { release }))
            .with_executor(Arc::new(FailingExecutor))
            .with_executor(Arc::new(PanickingExecutor))
            .with_event_bus(bus)
            .build()
    }

    #[tokio::test]
    async fn test_completed_task_reaches_100() {
        let release = Arc::new(Notify::new());
        let bus = Arc::new(EventBus::new(64));
        let mut events = bus.subscribe();
        let engine = engine(release.clone(), bus);

        let id = engine
            .submit(TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();
        release.notify_one();

        let task = engine.wait(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100.0);
        assert!(task.last_error.is_none());
        assert!(matches!(
            task.payload,
            TaskPayload::PersonCleanup(PersonCleanupPayload { people_checked: 3, .. })
        ));

        let mut saw_started = false;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                CoreEvent::Task(TaskEvent::Started { .. }) => saw_started = true,
                CoreEvent::Task(TaskEvent::Completed { .. }) => break,
                _ => {}
            }
        }
        assert!(saw_started);
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let release = Arc::new(Notify::new());
        let engine = engine(release, Arc::new(EventBus::new(64)));

        let id = engine
            .submit(TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();
        engine.cancel(&id).await.unwrap();

        let task = engine.wait(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.last_error.is_none());
        assert!(task.progress < 100.0);

        assert!(matches!(
            engine.cancel(&id).await,
            Err(TaskError::NotActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_records_last_error() {
        let engine = engine(Arc::new(Notify::new()), Arc::new(EventBus::new(64)));

        let id = engine
            .submit(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
            .await
            .unwrap();
        let task = engine.wait(&id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some("catalog unreachable"));
        assert_eq!(task.progress, 10.0);
    }

    #[tokio::test]
    async fn test_panic_fails_task() {
        let engine = engine(Arc::new(Notify::new()), Arc::new(EventBus::new(64)));

        let id = engine
            .submit(
                TaskType::ScanLibraries,
                TaskArgs::ScanLibraries { library_ids: None },
            )
            .await
            .unwrap();
        let task = engine.wait(&id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.last_error.unwrap().contains("executor bug"));
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let engine = TaskEngine::builder()
            .with_executor(Arc::new(FailingExecutor))
            .build();

        assert!(matches!(
            engine
                .submit(TaskType::RefreshMetadata, cleanup_args())
                .await,
            Err(TaskError::InvalidArgs(_))
        ));
        assert!(matches!(
            engine
                .submit(TaskType::PersonCleanup, cleanup_args())
                .await,
            Err(TaskError::NoExecutor(_))
        ));
    }

    #[tokio::test]
    async fn test_same_id_rejected_while_live_then_allowed() {
        let release = Arc::new(Notify::new());
        let engine = engine(release.clone(), Arc::new(EventBus::new(64)));
        let id = TaskId::new();

        engine
            .submit_with_id(id, TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();
        assert!(matches!(
            engine
                .submit_with_id(id, TaskType::PersonCleanup, cleanup_args())
                .await,
            Err(TaskError::AlreadyRunning { .. })
        ));

        release.notify_one();
        engine.wait(&id).await.unwrap();

        engine
            .submit_with_id(id, TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();
        release.notify_one();
        assert_eq!(
            engine.wait(&id).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let engine = engine(Arc::new(Notify::new()), Arc::new(EventBus::new(8)));
        let id = TaskId::new();

        assert!(matches!(
            engine.get_status(&id).await,
            Err(TaskError::NotFound { .. })
        ));
        assert!(matches!(
            engine.cancel(&id).await,
            Err(TaskError::NotFound { .. })
        ));
        assert!(!engine.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_parallel_tasks_and_listing() {
        let release = Arc::new(Notify::new());
        let engine = engine(release.clone(), Arc::new(EventBus::new(64)));

        let a = engine
            .submit(TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();
        let b = engine
            .submit(TaskType::PersonCleanup, cleanup_args())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let running = engine.list(Some(TaskStatus::Running), 10).await.unwrap();
        assert_eq!(running.len(), 2);

        engine.cancel(&a).await.unwrap();
        engine.cancel(&b).await.unwrap();
        engine.wait(&a).await.unwrap();
        engine.wait(&b).await.unwrap();

        assert_eq!(engine.list(None, 1).await.unwrap().len(), 1);
        assert!(engine.remove(&a).await.unwrap());
    }
}
