//! # Utilities Module
//!
//! Subscriber setup and the concurrent task runner.

pub(crate) mod logger;
pub(crate) mod runner;

pub use logger::{
    setup_logger, task_span, task_subscriber, TaskContextLayer, TaskPrefixFormatter,
    TaskSpanFields, TASK_SPAN,
};
pub use runner::{RunSummary, TaskRunner};
