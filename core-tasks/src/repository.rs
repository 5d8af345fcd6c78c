//! # Task Repository
//!
//! Persists task snapshots so status survives the process and interrupted
//! tasks can be recovered on the next start. Arguments and payloads are
//! stored as JSON text.

use crate::args::TaskArgs;
use crate::error::{Result, TaskError};
use crate::payload::TaskPayload;
use crate::task::{BackgroundTask, TaskId, TaskStatus};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts or replaces the snapshot with the same id
    async fn upsert(&self, task: &BackgroundTask) -> Result<()>;

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<BackgroundTask>>;

    /// Most recent tasks first
    async fn list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<BackgroundTask>>;

    /// Tasks still `Pending` or `Running`
    async fn find_active(&self) -> Result<Vec<BackgroundTask>>;
}

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    task_type: String,
    status: String,
    progress: f64,
    args: String,
    payload: String,
    last_error: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<TaskRow> for BackgroundTask {
    type Error = TaskError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let args: TaskArgs = serde_json::from_str(&row.args)?;
        let task_type = row.task_type.parse()?;
        if args.task_type() != task_type {
            return Err(TaskError::InvalidArgs(format!(
                "stored arguments do not match task type {}",
                task_type
            )));
        }

        Ok(BackgroundTask {
            id: TaskId::from_string(&row.id)?,
            task_type,
            status: row.status.parse()?,
            progress: row.progress,
            args,
            payload: serde_json::from_str::<TaskPayload>(&row.payload)?,
            last_error: row.last_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn upsert(&self, task: &BackgroundTask) -> Result<()> {
        let args = serde_json::to_string(&task.args)?;
        let payload = serde_json::to_string(&task.payload)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, task_type, status, progress, args, payload,
                last_error, created_at, started_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                task_type = excluded.task_type,
                status = excluded.status,
                progress = excluded.progress,
                args = excluded.args,
                payload = excluded.payload,
                last_error = excluded.last_error,
                created_at = excluded.created_at,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(task.progress)
        .bind(args)
        .bind(payload)
        .bind(&task.last_error)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<BackgroundTask>> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(BackgroundTask::try_from)
            .transpose()
    }

    async fn list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<BackgroundTask>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, TaskRow>(
                    "SELECT * FROM tasks WHERE status = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TaskRow>(
                    "SELECT * FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(BackgroundTask::try_from).collect()
    }

    async fn find_active(&self) -> Result<Vec<BackgroundTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE status IN ('Pending', 'Running') ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BackgroundTask::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::DownloadPayload;
    use core_library::db::create_test_pool;

    async fn repo() -> SqliteTaskRepository {
        SqliteTaskRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_replaces_snapshot() {
        let repo = repo().await;
        let mut task = BackgroundTask::new(
            TaskId::new(),
            TaskArgs::NodeDownload {
                node_id: "n1".to_string(),
                remote_path: "/movies/x.mkv".to_string(),
                library_id: "l1".to_string(),
            },
        );
        repo.upsert(&task).await.unwrap();

        task.transition(TaskStatus::Running).unwrap();
        task.progress = 42.0;
        task.payload = TaskPayload::Download(DownloadPayload::new("n1", "/movies/x.mkv", "/lib/x.mkv"));
        repo.upsert(&task).await.unwrap();

        let stored = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored, task);
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let repo = repo().await;
        let mut done = BackgroundTask::new(TaskId::new(), TaskArgs::RefreshMetadata);
        done.transition(TaskStatus::Running).unwrap();
        done.transition(TaskStatus::Completed).unwrap();
        repo.upsert(&done).await.unwrap();

        let pending = BackgroundTask::new(
            TaskId::new(),
            TaskArgs::PersonCleanup {
                person_ids: vec![1, 2],
            },
        );
        repo.upsert(&pending).await.unwrap();

        assert_eq!(repo.list(None, 10).await.unwrap().len(), 2);
        assert_eq!(repo.list(None, 1).await.unwrap().len(), 1);

        let completed = repo.list(Some(TaskStatus::Completed), 10).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let active = repo.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_missing_task() {
        let repo = repo().await;
        assert!(repo.find_by_id(&TaskId::new()).await.unwrap().is_none());
    }
}
