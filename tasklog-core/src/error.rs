//! # Core Error Types
//!
//! Centralized error definitions for the tasklog-core crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for task logging operations.
///
/// Wraps the configuration, template and format errors and adds the
/// lookup failures of the logging pipeline itself.
#[derive(Error, Debug)]
pub enum TaskLogError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Handler not found: '{name}'")]
    HandlerNotFound { name: String },

    #[error("Logger not found: '{name}'")]
    LoggerNotFound { name: String },

    #[error("Failed to write log line to handler '{handler}': {source}")]
    Sink {
        handler: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown configuration key: [{section}] {key}")]
    UnknownKey { section: String, key: String },

    #[error("Handler '{handler}' references unknown formatter '{formatter}'")]
    UnknownFormatter { handler: String, formatter: String },

    #[error("Logger '{logger}' references unknown handler '{handler}'")]
    UnknownHandler { logger: String, handler: String },

    #[error("Handler '{handler}' has kind 'file' but no path")]
    MissingPath { handler: String },

    #[error("Invalid log level '{value}'")]
    InvalidLevel { value: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },

    #[error("Parse error in {path}: {msg}")]
    ParseError { path: String, msg: String },
}

/// Prefix template errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Empty placeholder at byte {offset}")]
    EmptyPlaceholder { offset: usize },

    #[error("Template placeholder '{placeholder}' cannot be resolved against the task context")]
    UnresolvedPlaceholder { placeholder: String },
}

/// Log format string errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unknown log record field '{field}'")]
    UnknownField { field: String },

    #[error("Malformed placeholder at byte {offset} in '{format}'")]
    Malformed { format: String, offset: usize },
}

pub type Result<T, E = TaskLogError> = std::result::Result<T, E>;
