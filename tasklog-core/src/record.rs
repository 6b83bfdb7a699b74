use chrono::{DateTime, Local};
use std::panic::Location;
use tracing::Level;

/// A single log event routed through the pipeline.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub logger: String,
    pub level: Level,
    pub message: String,
    pub created: DateTime<Local>,
    pub module: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl LogRecord {
    pub fn new(logger: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            level,
            message: message.into(),
            created: Local::now(),
            module: None,
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, created: DateTime<Local>) -> Self {
        self.created = created;
        self
    }

    pub fn with_location(mut self, module: &str, file: &str, line: u32) -> Self {
        self.module = Some(module.to_string());
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }

    /// Source file and line of `location`; the module is derived from the
    /// file name when rendered.
    pub fn with_caller(mut self, location: &Location<'_>) -> Self {
        self.file = Some(location.file().to_string());
        self.line = Some(location.line());
        self
    }
}
