use crate::context::TaskInstance;
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub success: bool,
    pub message: String,
}

impl TaskResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    /// Returns the name of the task
    fn name(&self) -> &str;

    /// Executes one run of the task. Runs inside the task's `task_run` span.
    async fn run(&self, ti: &TaskInstance) -> Result<TaskResult>;
}
