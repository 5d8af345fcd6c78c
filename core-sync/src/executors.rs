//! Task executors backed by the synchronizer

use crate::synchronizer::MetadataSynchronizer;
use async_trait::async_trait;
use core_tasks::{TaskArgs, TaskContext, TaskError, TaskExecutor, TaskType};
use std::sync::Arc;

fn unexpected(task_type: TaskType, args: &TaskArgs) -> TaskError {
    TaskError::InvalidArgs(format!(
        "{} executor cannot run {} arguments",
        task_type,
        args.task_type()
    ))
}

pub struct ScanExecutor {
    synchronizer: Arc<MetadataSynchronizer>,
}

impl ScanExecutor {
    pub fn new(synchronizer: Arc<MetadataSynchronizer>) -> Self {
        Self { synchronizer }
    }
}

#[async_trait]
impl TaskExecutor for ScanExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::ScanLibraries
    }

    async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> core_tasks::Result<()> {
        match args {
            TaskArgs::ScanLibraries { library_ids } => {
                self.synchronizer.scan(ctx, library_ids.as_deref()).await?;
                Ok(())
            }
            other => Err(unexpected(self.task_type(), &other)),
        }
    }
}

pub struct RefreshExecutor {
    synchronizer: Arc<MetadataSynchronizer>,
}

impl RefreshExecutor {
    pub fn new(synchronizer: Arc<MetadataSynchronizer>) -> Self {
        Self { synchronizer }
    }
}

#[async_trait]
impl TaskExecutor for RefreshExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::RefreshMetadata
    }

    async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> core_tasks::Result<()> {
        match args {
            TaskArgs::RefreshMetadata => {
                self.synchronizer.refresh(ctx).await?;
                Ok(())
            }
            other => Err(unexpected(self.task_type(), &other)),
        }
    }
}

pub struct PersonCleanupExecutor {
    synchronizer: Arc<MetadataSynchronizer>,
}

impl PersonCleanupExecutor {
    pub fn new(synchronizer: Arc<MetadataSynchronizer>) -> Self {
        Self { synchronizer }
    }
}

#[async_trait]
impl TaskExecutor for PersonCleanupExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::PersonCleanup
    }

    async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> core_tasks::Result<()> {
        match args {
            TaskArgs::PersonCleanup { person_ids } => {
                self.synchronizer.person_cleanup(ctx, &person_ids).await?;
                Ok(())
            }
            other => Err(unexpected(self.task_type(), &other)),
        }
    }
}
