//! # Log Handlers
//!
//! A handler pairs a formatter with a sink. Handlers are owned by the
//! [`LoggingPipeline`](crate::pipeline::LoggingPipeline) and looked up by name.

use crate::config::{parse_level, HandlerConfig, HandlerKind, StreamTarget};
use crate::error::{ConfigError, Result, TaskLogError};
use crate::formatter::{LogFormatter, PlainFormatter, PrefixFormatter};
use crate::record::LogRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Shared line buffer behind a [`Sink::Memory`]. Clones see the same lines.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<String>>>);

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn push(&self, line: String) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(line);
    }
}

#[derive(Debug)]
pub enum Sink {
    Stdout,
    Stderr,
    File(File),
    Memory(MemoryBuffer),
}

impl Sink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        match self {
            Sink::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            Sink::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
            Sink::File(file) => {
                let mut file = file;
                writeln!(file, "{line}")
            }
            Sink::Memory(buffer) => {
                buffer.push(line.to_string());
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
pub struct Handler {
    name: String,
    level: Level,
    formatter: Box<dyn LogFormatter>,
    sink: Sink,
}

impl Handler {
    pub fn new(name: impl Into<String>, formatter: Box<dyn LogFormatter>, sink: Sink) -> Self {
        Self {
            name: name.into(),
            level: Level::TRACE,
            formatter,
            sink,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Build a handler from its config entry. `format` is the already
    /// resolved format string of the referenced formatter.
    pub fn from_config(name: &str, config: &HandlerConfig, format: &str) -> Result<Self> {
        let formatter: Box<dyn LogFormatter> = if config.task_prefix {
            Box::new(PrefixFormatter::new(format)?)
        } else {
            Box::new(PlainFormatter::new(format)?)
        };

        let sink = match config.kind {
            HandlerKind::Stream => match config.stream {
                StreamTarget::Stdout => Sink::Stdout,
                StreamTarget::Stderr => Sink::Stderr,
            },
            HandlerKind::File => {
                let path = config.path.as_ref().ok_or_else(|| ConfigError::MissingPath {
                    handler: name.to_string(),
                })?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| ConfigError::IoError {
                        path: path.display().to_string(),
                        msg: e.to_string(),
                    })?;
                Sink::File(file)
            }
            HandlerKind::Memory => Sink::Memory(MemoryBuffer::new()),
        };

        let mut handler = Self::new(name, formatter, sink);
        if let Some(level) = &config.level {
            handler.level = parse_level(level)?;
        }
        Ok(handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn formatter(&self) -> &dyn LogFormatter {
        self.formatter.as_ref()
    }

    pub fn formatter_mut(&mut self) -> &mut dyn LogFormatter {
        self.formatter.as_mut()
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn LogFormatter>) {
        self.formatter = formatter;
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Lines captured by a memory sink, `None` for other sinks.
    pub fn captured(&self) -> Option<Vec<String>> {
        match &self.sink {
            Sink::Memory(buffer) => Some(buffer.lines()),
            _ => None,
        }
    }

    /// Format and write a record. Records less severe than the handler
    /// level are dropped silently.
    pub fn emit(&self, record: &LogRecord) -> Result<()> {
        if record.level > self.level {
            return Ok(());
        }
        let line = self.formatter.format(record);
        self.sink
            .write_line(&line)
            .map_err(|source| TaskLogError::Sink {
                handler: self.name.clone(),
                source,
            })
    }
}
