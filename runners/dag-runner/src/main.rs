use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tasklog_core::{
    setup_logger, LoggingConfig, LoggingPipeline, Task, TaskIdentity, TaskInstance, TaskRunner,
    TASK_LOGGER,
};
use tracing::info;

mod tasks;

use tasks::SleepTask;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/logging.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run demo tasks concurrently, each under its own task span
    Run {
        #[arg(long, default_value = "example_dag")]
        dag_id: String,
        #[arg(short, long, default_value_t = 3)]
        workers: usize,
    },
    /// Print one line through the configured `task` handler
    Check {
        #[arg(long, default_value = "example_dag")]
        dag_id: String,
        #[arg(long, default_value = "check")]
        task_id: String,
    },
}

fn load_config(path: &str) -> Result<LoggingConfig> {
    // Auto-detect config path when run from the workspace root
    let path = if std::path::Path::new(path).exists() {
        path.to_string()
    } else if path == "config/logging.toml"
        && std::path::Path::new("runners/dag-runner/config/logging.toml").exists()
    {
        "runners/dag-runner/config/logging.toml".to_string()
    } else {
        path.to_string()
    };

    let mut config = if std::path::Path::new(&path).exists() {
        LoggingConfig::from_path(&path).with_context(|| format!("Failed to load {}", path))?
    } else {
        LoggingConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

fn run_id() -> String {
    format!("manual__{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%:z"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    let config = load_config(&args.config)?;

    match args.command.unwrap_or(Commands::Run {
        dag_id: "example_dag".to_string(),
        workers: 3,
    }) {
        Commands::Run { dag_id, workers } => {
            let _log_guard = setup_logger(&config)?;
            let run_id = run_id();

            let tasks: Vec<(Arc<dyn Task>, TaskInstance)> = (1..=workers)
                .map(|i| {
                    let task = SleepTask::new(format!("task_{:02}", i));
                    let ti = TaskInstance::new(TaskIdentity::new(&dag_id, &task.name), &run_id);
                    (Arc::new(task) as Arc<dyn Task>, ti)
                })
                .collect();

            let summary = TaskRunner::run_all(tasks).await;
            info!("{} succeeded, {} failed", summary.succeeded, summary.failed);
        }
        Commands::Check { dag_id, task_id } => {
            let mut pipeline =
                LoggingPipeline::from_config(&config).context("Invalid logging config")?;
            let ti = TaskInstance::new(TaskIdentity::new(dag_id, task_id), run_id());
            let run = pipeline.begin_run(TASK_LOGGER, &ti)?;
            run.info("Task log prefix installed")?;
        }
    }

    Ok(())
}
