//! Demo tasks for the runner.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tasklog_core::{Task, TaskInstance, TaskResult};
use tracing::{info, warn};

/// Sleeps for a random interval and fails with the given probability.
#[derive(Debug, Clone)]
pub struct SleepTask {
    pub name: String,
    pub min_ms: u64,
    pub max_ms: u64,
    pub fail_rate: f64,
}

impl SleepTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_ms: 50,
            max_ms: 400,
            fail_rate: 0.2,
        }
    }
}

#[async_trait]
impl Task for SleepTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ti: &TaskInstance) -> Result<TaskResult> {
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_ms..=self.max_ms),
                rng.gen_bool(self.fail_rate.clamp(0.0, 1.0)),
            )
        };

        info!("Working for {}ms (run {})", delay, ti.run_id());
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if fail {
            warn!("Upstream data not ready");
            return Ok(TaskResult::failure("upstream data not ready"));
        }
        Ok(TaskResult::success(format!("finished in {}ms", delay)))
    }
}
