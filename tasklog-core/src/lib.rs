//! # Tasklog Core - Task-scoped log prefixes for workflow runners
//!
//! Every log line a task run emits can carry a prefix rendered from a
//! configurable template (`{{ti.dag_id}}-{{ti.task_id}}`) against the run's
//! identity.
//!
//! ## Modules
//!
//! - [`config`] - Typed logging configuration and scoped overrides
//! - [`context`] - Task identity and execution context
//! - [`error`] - Typed error handling with thiserror
//! - [`formatter`] - `%(field)s` format strings and the prefix formatter
//! - [`handler`] - Handlers and their sinks
//! - [`pipeline`] - Handler/logger maps and task context injection
//! - [`template`] - Prefix template parsing and rendering
//! - [`traits`] - Core trait definitions
//! - `utils` - tracing integration and the concurrent task runner

pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod pipeline;
pub mod record;
pub mod template;
pub mod traits;
pub(crate) mod utils;

pub use config::{
    ConfigOverride, FormatterConfig, HandlerConfig, HandlerKind, LoggerConfig, LoggingConfig,
    StreamTarget, TASK_HANDLER, TASK_LOGGER,
};
pub use context::{TaskIdentity, TaskInstance, TemplateContext};
pub use error::{ConfigError, FormatError, TaskLogError, TemplateError};
pub use formatter::{FormatString, LogFormatter, PlainFormatter, PrefixFormatter};
pub use handler::{Handler, MemoryBuffer, Sink};
pub use pipeline::{LoggingPipeline, SharedPipeline, TaskLogScope, ROOT_LOGGER};
pub use record::LogRecord;
pub use template::PrefixTemplate;
pub use traits::{Task, TaskResult};

pub use utils::{
    setup_logger, task_span, task_subscriber, RunSummary, TaskContextLayer,
    TaskPrefixFormatter, TaskRunner, TaskSpanFields, TASK_SPAN,
};
