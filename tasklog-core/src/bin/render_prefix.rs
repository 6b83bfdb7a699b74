use anyhow::{Context, Result};
use clap::Parser;
use tasklog_core::{LoggingConfig, LoggingPipeline, TaskIdentity, TaskInstance, TASK_LOGGER};

/// Render one task log line through the configured pipeline.
#[derive(Parser)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,
    #[arg(long)]
    dag_id: String,
    #[arg(long)]
    task_id: String,
    #[arg(long, default_value = "manual")]
    run_id: String,
    #[arg(long, default_value = TASK_LOGGER)]
    logger: String,
    #[arg(short, long, default_value = "Task log prefix check")]
    message: String,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoggingConfig::from_path(path).context("Failed to load logging config")?,
        None => LoggingConfig::default(),
    };
    config.apply_env_overrides();

    let mut pipeline = LoggingPipeline::from_config(&config).context("Invalid logging config")?;
    let ti = TaskInstance::new(TaskIdentity::new(args.dag_id, args.task_id), args.run_id);

    let run = pipeline
        .begin_run(&args.logger, &ti)
        .context("Failed to install task log context")?;
    run.info(args.message)?;

    Ok(())
}
