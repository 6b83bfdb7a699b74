use crate::context::TaskInstance;
use crate::traits::{Task, TaskResult};
use crate::utils::logger::task_span;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: u64,
    pub failed: u64,
    /// (task name, result) in completion order
    pub results: Vec<(String, TaskResult)>,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        let total = self.succeeded + self.failed;
        if total > 0 {
            (self.succeeded as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

pub struct TaskRunner;

impl TaskRunner {
    /// Runs every task concurrently, each inside its own `task_run` span,
    /// and waits for all of them.
    ///
    /// A task returning `Err` or panicking counts as failed.
    pub async fn run_all(tasks: Vec<(Arc<dyn Task>, TaskInstance)>) -> RunSummary {
        let mut set = JoinSet::new();
        let start_time = std::time::Instant::now();
        info!("Starting {} task runs...", tasks.len());

        for (task, ti) in tasks {
            let span = task_span(&ti);
            set.spawn(
                async move {
                    let name = task.name().to_string();
                    info!("Starting attempt {}", ti.try_number());
                    let result = match task.run(&ti).await {
                        Ok(result) => result,
                        Err(e) => {
                            error!("Task failed: {:?}", e);
                            TaskResult::failure(e.to_string())
                        }
                    };
                    if result.success {
                        info!("Task SUCCESS: {}", result.message);
                    } else {
                        warn!("Task FAILED: {}", result.message);
                    }
                    (name, result)
                }
                .instrument(span),
            );
        }

        let mut summary = RunSummary::default();
        while let Some(res) = set.join_next().await {
            match res {
                Ok((name, result)) => {
                    if result.success {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                    summary.results.push((name, result));
                }
                Err(e) => {
                    error!("A task run panicked or failed to join: {:?}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Total Time: {:.1}s | Success: {} | Fail: {} | Success Rate: {:.2}%",
            start_time.elapsed().as_secs_f64(),
            summary.succeeded,
            summary.failed,
            summary.success_rate()
        );
        summary
    }
}
