//! Integration tests for task persistence
//!
//! These tests run the engine against the SQLite task repository and verify:
//! - Snapshots are written through on every state change
//! - Settled tasks leave the in-memory registry and remain queryable
//! - Tasks left active by a previous process are recovered as failed

use async_trait::async_trait;
use core_library::db::create_test_pool;
use core_tasks::{
    BackgroundTask, SqliteTaskRepository, TaskArgs, TaskContext, TaskEngine, TaskError,
    TaskExecutor, TaskId, TaskRepository, TaskStatus, TaskType,
};
use std::sync::Arc;
use std::time::Duration;

/// Reports progress in four steps and finishes
struct CountingExecutor;

#[async_trait]
impl TaskExecutor for CountingExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::RefreshMetadata
    }

    async fn execute(&self, ctx: &TaskContext, _args: TaskArgs) -> core_tasks::Result<()> {
        for step in 1..=4 {
            ctx.check_cancelled()?;
            ctx.report_progress(step as f64 * 20.0).await;
        }
        ctx.record_error("1 item failed").await;
        Ok(())
    }
}

/// Waits until the engine holds at most `count` tasks in memory
async fn registry_drains_to(engine: &TaskEngine, count: usize) -> usize {
    for _ in 0..200 {
        if engine.tracked_tasks().await <= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    engine.tracked_tasks().await
}

async fn setup() -> anyhow::Result<(TaskEngine, Arc<SqliteTaskRepository>)> {
    let pool = create_test_pool().await?;
    let repository = Arc::new(SqliteTaskRepository::new(pool));
    let engine = TaskEngine::builder()
        .with_executor(Arc::new(CountingExecutor))
        .with_repository(repository.clone())
        .build();
    Ok((engine, repository))
}

#[tokio::test]
async fn test_final_state_is_persisted() -> anyhow::Result<()> {
    let (engine, repository) = setup().await?;

    let id = engine
        .submit(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
        .await?;
    let finished = engine.wait(&id).await?;

    let stored = repository.find_by_id(&id).await?.expect("task persisted");
    assert_eq!(stored, finished);
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert_eq!(stored.last_error.as_deref(), Some("1 item failed"));
    Ok(())
}

#[tokio::test]
async fn test_history_survives_registry_removal() -> anyhow::Result<()> {
    let (engine, _repository) = setup().await?;

    let id = engine
        .submit(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
        .await?;
    engine.wait(&id).await?;
    assert_eq!(registry_drains_to(&engine, 0).await, 0);
    assert!(!engine.remove(&id).await?);

    let status = engine.get_status(&id).await?;
    assert_eq!(status.status, TaskStatus::Completed);
    assert!(matches!(
        engine.cancel(&id).await,
        Err(TaskError::NotActive { .. })
    ));
    assert_eq!(engine.wait(&id).await?.id, id);

    let listed = engine.list(Some(TaskStatus::Completed), 10).await?;
    assert_eq!(listed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_settled_tasks_leave_the_registry() -> anyhow::Result<()> {
    let (engine, repository) = setup().await?;

    let mut ids = Vec::new();
    for _ in 0..50 {
        ids.push(
            engine
                .submit(TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
                .await?,
        );
    }
    for id in &ids {
        assert_eq!(engine.wait(id).await?.status, TaskStatus::Completed);
    }

    assert_eq!(registry_drains_to(&engine, 0).await, 0);
    assert_eq!(repository.list(None, 100).await?.len(), 50);
    assert_eq!(engine.get_status(&ids[0]).await?.progress, 100.0);

    // The id is free again once the first run has settled
    engine
        .submit_with_id(ids[0], TaskType::RefreshMetadata, TaskArgs::RefreshMetadata)
        .await?;
    assert_eq!(engine.wait(&ids[0]).await?.status, TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_recover_interrupted_tasks() -> anyhow::Result<()> {
    let (engine, repository) = setup().await?;

    let mut running = BackgroundTask::new(TaskId::new(), TaskArgs::RefreshMetadata);
    running.transition(TaskStatus::Running)?;
    repository.upsert(&running).await?;

    let pending = BackgroundTask::new(
        TaskId::new(),
        TaskArgs::ScanLibraries { library_ids: None },
    );
    repository.upsert(&pending).await?;

    assert_eq!(engine.recover_interrupted().await?, 2);
    assert_eq!(engine.recover_interrupted().await?, 0);

    let recovered = engine.get_status(&running.id).await?;
    assert_eq!(recovered.status, TaskStatus::Failed);
    assert_eq!(
        recovered.last_error.as_deref(),
        Some("Interrupted by shutdown")
    );
    assert!(repository.find_active().await?.is_empty());
    Ok(())
}
