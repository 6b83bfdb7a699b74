//! # Logging Configuration
//!
//! Typed replacement for a process-wide logging dictionary. A
//! [`LoggingConfig`] is an explicit value handed to
//! [`LoggingPipeline::from_config`](crate::pipeline::LoggingPipeline::from_config);
//! nothing here is global.
//!
//! ```toml
//! [logging]
//! task_log_prefix_template = "{{ti.dag_id}}-{{ti.task_id}}"
//!
//! [formatters.airflow]
//! format = "%(asctime)s %(message)s"
//!
//! [handlers.task]
//! kind = "stream"
//! formatter = "airflow"
//! stream = "stdout"
//! task_prefix = true
//!
//! [loggers."airflow.task"]
//! handlers = ["task"]
//! ```

mod overrides;

pub use overrides::ConfigOverride;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn, Level};

/// Prefix of environment variables that override `[section] key` values,
/// e.g. `TASKLOG__LOGGING__TASK_LOG_PREFIX_TEMPLATE`.
pub const ENV_PREFIX: &str = "TASKLOG__";

pub const DEFAULT_LOG_FORMAT: &str =
    "[%(asctime)s] {%(filename)s:%(lineno)d} %(levelname)s - %(message)s";
pub const DEFAULT_FORMATTER: &str = "airflow";
pub const TASK_HANDLER: &str = "task";
pub const TASK_LOGGER: &str = "airflow.task";

/// Sections missing from a loaded file are empty, not the built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterConfig>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerConfig>,
    #[serde(default)]
    pub root: LoggerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Placeholders are resolved against the running task instance.
    pub task_log_prefix_template: Option<String>,
    /// Used by formatters that do not set their own format.
    pub log_format: String,
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            task_log_prefix_template: None,
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterConfig {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Stream,
    File,
    /// Keeps lines in memory; used by tests and dry runs.
    Memory,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTarget {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub kind: HandlerKind,
    pub formatter: String,
    #[serde(default)]
    pub stream: StreamTarget,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub level: Option<String>,
    /// Build the handler with a formatter that accepts task prefixes.
    #[serde(default)]
    pub task_prefix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_propagate")]
    pub propagate: bool,
}

fn default_propagate() -> bool {
    true
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            level: None,
            propagate: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let formatters = BTreeMap::from([(
            DEFAULT_FORMATTER.to_string(),
            FormatterConfig {
                format: Some(DEFAULT_LOG_FORMAT.to_string()),
            },
        )]);

        let handlers = BTreeMap::from([
            (
                "console".to_string(),
                HandlerConfig {
                    kind: HandlerKind::Stream,
                    formatter: DEFAULT_FORMATTER.to_string(),
                    stream: StreamTarget::Stdout,
                    path: None,
                    level: None,
                    task_prefix: false,
                },
            ),
            (
                TASK_HANDLER.to_string(),
                HandlerConfig {
                    kind: HandlerKind::Stream,
                    formatter: DEFAULT_FORMATTER.to_string(),
                    stream: StreamTarget::Stdout,
                    path: None,
                    level: None,
                    task_prefix: true,
                },
            ),
        ]);

        let loggers = BTreeMap::from([(
            TASK_LOGGER.to_string(),
            LoggerConfig {
                handlers: vec![TASK_HANDLER.to_string()],
                level: None,
                propagate: false,
            },
        )]);

        Self {
            logging: LoggingSection::default(),
            formatters,
            handlers,
            loggers,
            root: LoggerConfig {
                handlers: vec!["console".to_string()],
                level: None,
                propagate: true,
            },
        }
    }
}

impl LoggingConfig {
    /// Load configuration from a TOML or JSON file (chosen by extension).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: shown.clone(),
            msg: e.to_string(),
        })?;

        let parsed: Result<Self, String> = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        };
        let config: Self = parsed.map_err(|msg| ConfigError::ParseError {
            path: shown.clone(),
            msg,
        })?;

        debug!(path = %shown, handlers = config.handlers.len(), "Loaded logging config");
        Ok(config)
    }

    /// The prefix template, or `None` when unset or blank.
    pub fn prefix_template(&self) -> Option<&str> {
        self.logging
            .task_log_prefix_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// Read a `[section] key` value.
    pub fn get(&self, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
        match (section, key) {
            ("logging", "task_log_prefix_template") => {
                Ok(self.logging.task_log_prefix_template.clone())
            }
            ("logging", "log_format") => Ok(Some(self.logging.log_format.clone())),
            ("logging", "level") => Ok(Some(self.logging.level.clone())),
            _ => Err(unknown_key(section, key)),
        }
    }

    /// Set a `[section] key` value, returning the previous one.
    pub fn set(
        &mut self,
        section: &str,
        key: &str,
        value: Option<String>,
    ) -> Result<Option<String>, ConfigError> {
        let required = |value: Option<String>| {
            value.ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{section}.{key}"),
                reason: "value cannot be unset".to_string(),
            })
        };

        match (section, key) {
            ("logging", "task_log_prefix_template") => Ok(std::mem::replace(
                &mut self.logging.task_log_prefix_template,
                value,
            )),
            ("logging", "log_format") => Ok(Some(std::mem::replace(
                &mut self.logging.log_format,
                required(value)?,
            ))),
            ("logging", "level") => {
                let value = required(value)?;
                parse_level(&value)?;
                Ok(Some(std::mem::replace(&mut self.logging.level, value)))
            }
            _ => Err(unknown_key(section, key)),
        }
    }

    /// Temporarily set `[section] key` values; the returned guard restores
    /// the previous values when dropped.
    pub fn override_vars(
        &mut self,
        vars: &[((&str, &str), Option<&str>)],
    ) -> Result<ConfigOverride<'_>, ConfigError> {
        ConfigOverride::apply(self, vars)
    }

    /// Apply `TASKLOG__<SECTION>__<KEY>` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> usize {
        self.apply_overrides_from(std::env::vars())
    }

    /// Apply `TASKLOG__<SECTION>__<KEY>` pairs. Unknown keys are skipped with a
    /// warning. Returns how many values were applied.
    pub fn apply_overrides_from<I>(&mut self, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((section, key)) = rest.split_once("__") else {
                warn!(var = %name, "Ignoring malformed config override");
                continue;
            };
            let (section, key) = (section.to_lowercase(), key.to_lowercase());
            match self.set(&section, &key, Some(value)) {
                Ok(_) => applied += 1,
                Err(e) => warn!(var = %name, error = %e, "Ignoring config override"),
            }
        }
        applied
    }
}

fn unknown_key(section: &str, key: &str) -> ConfigError {
    ConfigError::UnknownKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Parse a level name. `WARNING` and `CRITICAL` are accepted as aliases.
pub fn parse_level(value: &str) -> Result<Level, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Ok(Level::ERROR),
        _ => Err(ConfigError::InvalidLevel {
            value: value.to_string(),
        }),
    }
}
