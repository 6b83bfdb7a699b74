//! # Logging Pipeline
//!
//! Typed handler and logger maps built from a [`LoggingConfig`], plus the
//! task context hook that installs a rendered prefix on every
//! prefix-capable handler reachable from a logger.
//!
//! Logger names are dotted (`airflow.task`). A record logged to a logger is
//! handled by that logger's handlers and then by each ancestor's, up to the
//! root, until a logger with `propagate = false` is reached.
//!
//! The prefix lives in handler formatters shared by every record the
//! handler emits, so a prefix must be installed once per task run and runs
//! must not interleave on one pipeline. [`LoggingPipeline::begin_run`]
//! enforces that through an exclusive borrow; [`SharedPipeline`] does it
//! with a mutex held for the whole run.

use crate::config::{parse_level, LoggerConfig, LoggingConfig};
use crate::context::TaskInstance;
use crate::error::{ConfigError, Result, TaskLogError};
use crate::handler::Handler;
use crate::record::LogRecord;
use crate::template::PrefixTemplate;
use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn, Level};

pub const ROOT_LOGGER: &str = "root";

#[derive(Debug, Clone)]
struct Logger {
    handlers: Vec<String>,
    level: Option<Level>,
    propagate: bool,
}

impl Logger {
    fn from_config(
        name: &str,
        config: &LoggerConfig,
        handlers: &BTreeMap<String, Handler>,
    ) -> Result<Self> {
        if let Some(missing) = config.handlers.iter().find(|h| !handlers.contains_key(*h)) {
            return Err(ConfigError::UnknownHandler {
                logger: name.to_string(),
                handler: missing.clone(),
            }
            .into());
        }
        Ok(Self {
            handlers: config.handlers.clone(),
            level: config.level.as_deref().map(parse_level).transpose()?,
            propagate: config.propagate,
        })
    }
}

#[derive(Debug)]
pub struct LoggingPipeline {
    handlers: BTreeMap<String, Handler>,
    loggers: BTreeMap<String, Logger>,
    root: Logger,
    prefix_template: Option<PrefixTemplate>,
    level: Level,
}

impl LoggingPipeline {
    /// Build the pipeline from an explicit configuration value.
    pub fn from_config(config: &LoggingConfig) -> Result<Self> {
        let mut handlers = BTreeMap::new();
        for (name, handler_config) in &config.handlers {
            let formatter = config.formatters.get(&handler_config.formatter).ok_or_else(|| {
                ConfigError::UnknownFormatter {
                    handler: name.clone(),
                    formatter: handler_config.formatter.clone(),
                }
            })?;
            let format = formatter
                .format
                .as_deref()
                .unwrap_or(&config.logging.log_format);
            handlers.insert(name.clone(), Handler::from_config(name, handler_config, format)?);
        }

        let mut loggers = BTreeMap::new();
        for (name, logger_config) in &config.loggers {
            loggers.insert(name.clone(), Logger::from_config(name, logger_config, &handlers)?);
        }
        let root = Logger::from_config(ROOT_LOGGER, &config.root, &handlers)?;

        let prefix_template = config
            .prefix_template()
            .map(PrefixTemplate::parse)
            .transpose()?;

        debug!(
            handlers = handlers.len(),
            loggers = loggers.len(),
            prefix_template = ?prefix_template.as_ref().map(PrefixTemplate::as_str),
            "Logging pipeline configured"
        );

        Ok(Self {
            handlers,
            loggers,
            root,
            prefix_template,
            level: parse_level(&config.logging.level)?,
        })
    }

    pub fn handler(&self, name: &str) -> Result<&Handler> {
        self.handlers
            .get(name)
            .ok_or_else(|| TaskLogError::HandlerNotFound {
                name: name.to_string(),
            })
    }

    pub fn handler_mut(&mut self, name: &str) -> Result<&mut Handler> {
        self.handlers
            .get_mut(name)
            .ok_or_else(|| TaskLogError::HandlerNotFound {
                name: name.to_string(),
            })
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Register a handler, replacing one with the same name.
    pub fn insert_handler(&mut self, handler: Handler) -> Option<Handler> {
        self.handlers.insert(handler.name().to_string(), handler)
    }

    /// Attach a registered handler to a logger, creating the logger entry
    /// if needed.
    pub fn attach(&mut self, logger: &str, handler: &str) -> Result<()> {
        if !self.handlers.contains_key(handler) {
            return Err(TaskLogError::HandlerNotFound {
                name: handler.to_string(),
            });
        }
        let entry = if is_root(logger) {
            &mut self.root
        } else {
            self.loggers.entry(logger.to_string()).or_insert_with(|| Logger {
                handlers: Vec::new(),
                level: None,
                propagate: true,
            })
        };
        if !entry.handlers.iter().any(|h| h == handler) {
            entry.handlers.push(handler.to_string());
        }
        Ok(())
    }

    pub fn prefix_template(&self) -> Option<&PrefixTemplate> {
        self.prefix_template.as_ref()
    }

    pub fn set_prefix_template(&mut self, template: Option<PrefixTemplate>) {
        self.prefix_template = template.filter(|t| !t.is_empty());
    }

    /// Level of the nearest configured logger in the chain, else the
    /// pipeline default.
    pub fn effective_level(&self, logger: &str) -> Level {
        ancestry(logger)
            .filter_map(|name| self.logger(name))
            .find_map(|l| l.level)
            .unwrap_or(self.level)
    }

    fn logger(&self, name: &str) -> Option<&Logger> {
        if is_root(name) {
            Some(&self.root)
        } else {
            self.loggers.get(name)
        }
    }

    /// Handler names reachable from `logger`, in visiting order, each once.
    ///
    /// A logger is known if it or one of its dotted ancestors is configured.
    pub fn handler_chain(&self, logger: &str) -> Result<Vec<String>> {
        let known = is_root(logger)
            || ancestry(logger)
                .take_while(|name| !is_root(name))
                .any(|name| self.loggers.contains_key(name));
        if !known {
            return Err(TaskLogError::LoggerNotFound {
                name: logger.to_string(),
            });
        }

        let mut chain: Vec<String> = Vec::new();
        for name in ancestry(logger) {
            let Some(entry) = self.logger(name) else {
                continue;
            };
            for handler in &entry.handlers {
                if !chain.contains(handler) {
                    chain.push(handler.clone());
                }
            }
            if !entry.propagate {
                break;
            }
        }
        Ok(chain)
    }

    /// Install the rendered task prefix on every prefix-capable handler
    /// reachable from `logger`.
    ///
    /// The template is rendered before any handler is touched, so a
    /// placeholder the task cannot resolve leaves every formatter as it was.
    /// Without a template the handlers are reset to their base format. Raw
    /// task instances are left alone.
    pub fn set_context(&mut self, logger: &str, ti: &TaskInstance) -> Result<()> {
        if ti.is_raw() {
            trace!(
                dag_id = ti.dag_id(),
                task_id = ti.task_id(),
                "Raw task instance, prefix not installed"
            );
            return Ok(());
        }

        let chain = self.handler_chain(logger)?;
        let prefix = self
            .prefix_template
            .as_ref()
            .map(|template| template.render(ti))
            .transpose()?;

        for name in chain {
            let handler = self.handler_mut(&name)?;
            match handler.formatter_mut().as_prefix_mut() {
                Some(formatter) => match &prefix {
                    Some(prefix) => formatter.apply_prefix(prefix),
                    None => formatter.clear_prefix(),
                },
                None => trace!(handler = %name, "Formatter does not accept a task prefix, skipping"),
            }
        }

        debug!(
            logger,
            dag_id = ti.dag_id(),
            task_id = ti.task_id(),
            run_id = ti.run_id(),
            prefix = prefix.as_deref().unwrap_or(""),
            "Task log context installed"
        );
        Ok(())
    }

    /// Reset every prefix-capable handler reachable from `logger` to its
    /// base format.
    pub fn clear_context(&mut self, logger: &str) -> Result<()> {
        for name in self.handler_chain(logger)? {
            if let Some(formatter) = self.handler_mut(&name)?.formatter_mut().as_prefix_mut() {
                formatter.clear_prefix();
            }
        }
        Ok(())
    }

    /// Dispatch a record to every handler reachable from its logger.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level > self.effective_level(&record.logger) {
            return Ok(());
        }
        for name in self.handler_chain(&record.logger)? {
            self.handler(&name)?.emit(record)?;
        }
        Ok(())
    }

    /// Install `ti`'s context on `logger` for the lifetime of the returned
    /// scope. Dropping the scope resets the prefixes.
    pub fn begin_run(&mut self, logger: &str, ti: &TaskInstance) -> Result<TaskLogScope<'_>> {
        self.set_context(logger, ti)?;
        Ok(TaskLogScope {
            pipeline: self,
            logger: logger.to_string(),
        })
    }
}

fn is_root(name: &str) -> bool {
    name.is_empty() || name == ROOT_LOGGER
}

/// `a.b.c`, `a.b`, `a`, `root`
fn ancestry(logger: &str) -> impl Iterator<Item = &str> {
    let start = (!is_root(logger)).then_some(logger);
    std::iter::successors(start, |name| name.rsplit_once('.').map(|(parent, _)| parent))
        .chain(std::iter::once(ROOT_LOGGER))
}

/// Logging for one task run. Holds the pipeline exclusively.
#[derive(Debug)]
pub struct TaskLogScope<'a> {
    pipeline: &'a mut LoggingPipeline,
    logger: String,
}

impl TaskLogScope<'_> {
    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn pipeline(&self) -> &LoggingPipeline {
        &*self.pipeline
    }

    /// Log at `level`, recording the caller's file and line.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>) -> Result<()> {
        let record =
            LogRecord::new(self.logger.clone(), level, message).with_caller(Location::caller());
        self.pipeline.log(&record)
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::INFO, message)
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::WARN, message)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::ERROR, message)
    }
}

impl Drop for TaskLogScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.clear_context(&self.logger) {
            warn!(logger = %self.logger, error = %e, "Failed to clear task log context");
        }
    }
}

/// A pipeline shared between threads. Each run holds the lock from prefix
/// installation until its last record, so runs never see each other's
/// prefix.
#[derive(Debug, Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<LoggingPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: LoggingPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub fn run<F, T>(&self, logger: &str, ti: &TaskInstance, f: F) -> Result<T>
    where
        F: FnOnce(&TaskLogScope<'_>) -> Result<T>,
    {
        let mut pipeline = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let scope = pipeline.begin_run(logger, ti)?;
        f(&scope)
    }

    /// Run `f` with the pipeline locked, outside any task run.
    pub fn with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut LoggingPipeline) -> T,
    {
        let mut pipeline = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut pipeline)
    }
}
