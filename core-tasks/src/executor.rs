use crate::args::TaskArgs;
use crate::context::TaskContext;
use crate::error::Result;
use crate::task::TaskType;
use async_trait::async_trait;

/// Unit of work the engine runs for one task type.
///
/// Executors poll [`TaskContext::check_cancelled`] between units of work and
/// return `Err(TaskError::Cancelled)` once they stop because of it. Any other
/// error fails the task with its message as `last_error`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn execute(&self, ctx: &TaskContext, args: TaskArgs) -> Result<()>;
}
