//! # Log Formatters
//!
//! Format strings use `%(field)s` placeholders, with an optional `-` flag and
//! width (`%(levelname)-8s`). `%%` renders a literal percent sign.
//!
//! [`PrefixFormatter`] keeps its base format apart from the effective,
//! prefixed one so a task prefix can be swapped without piling up.

use crate::error::FormatError;
use crate::record::LogRecord;
use std::fmt;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordField {
    Asctime,
    Message,
    Levelname,
    Name,
    Module,
    Filename,
    Lineno,
    Created,
    Process,
}

impl RecordField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "asctime" => Self::Asctime,
            "message" => Self::Message,
            "levelname" => Self::Levelname,
            "name" => Self::Name,
            "module" => Self::Module,
            "filename" => Self::Filename,
            "lineno" => Self::Lineno,
            "created" => Self::Created,
            "process" => Self::Process,
            _ => return None,
        })
    }

    fn render(self, record: &LogRecord) -> String {
        match self {
            Self::Asctime => record.created.format("%Y-%m-%d %H:%M:%S,%3f").to_string(),
            Self::Message => record.message.clone(),
            Self::Levelname => level_name(&record.level).to_string(),
            Self::Name => record.logger.clone(),
            Self::Module => record
                .module
                .clone()
                .or_else(|| file_name(record).map(|f| f.trim_end_matches(".rs").to_string()))
                .unwrap_or_else(|| "unknown module".to_string()),
            Self::Filename => file_name(record)
                .map(str::to_string)
                .unwrap_or_else(|| "(unknown file)".to_string()),
            Self::Lineno => record.line.unwrap_or(0).to_string(),
            Self::Created => format!("{:.3}", record.created.timestamp_millis() as f64 / 1000.0),
            Self::Process => std::process::id().to_string(),
        }
    }
}

fn file_name(record: &LogRecord) -> Option<&str> {
    record
        .file
        .as_deref()
        .map(|path| path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path))
}

pub(crate) fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field {
        field: RecordField,
        width: usize,
        left: bool,
    },
}

/// A validated `%(field)s` format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatString {
    source: String,
    pieces: Vec<Piece>,
}

impl FormatString {
    pub fn parse(source: &str) -> Result<Self, FormatError> {
        let malformed = |offset| FormatError::Malformed {
            format: source.to_string(),
            offset,
        };

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let bytes = source.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let Some(rel) = source[i..].find('%') else {
                literal.push_str(&source[i..]);
                break;
            };
            let start = i + rel;
            literal.push_str(&source[i..start]);

            match bytes.get(start + 1) {
                Some(b'%') => {
                    literal.push('%');
                    i = start + 2;
                }
                Some(b'(') => {
                    let close = source[start + 2..]
                        .find(')')
                        .map(|c| start + 2 + c)
                        .ok_or_else(|| malformed(start))?;
                    let name = &source[start + 2..close];
                    let field = RecordField::parse(name).ok_or_else(|| {
                        FormatError::UnknownField {
                            field: name.to_string(),
                        }
                    })?;

                    let mut j = close + 1;
                    let left = bytes.get(j) == Some(&b'-');
                    if left {
                        j += 1;
                    }
                    let digits_start = j;
                    while bytes.get(j).is_some_and(u8::is_ascii_digit) {
                        j += 1;
                    }
                    // std formatting rejects widths above u16::MAX at render time
                    let width = if j > digits_start {
                        source[digits_start..j]
                            .parse::<u16>()
                            .map(usize::from)
                            .map_err(|_| malformed(start))?
                    } else {
                        0
                    };
                    match bytes.get(j) {
                        Some(b's' | b'd' | b'r' | b'f') => {}
                        _ => return Err(malformed(start)),
                    }

                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Field { field, width, left });
                    i = j + 1;
                }
                _ => return Err(malformed(start)),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            pieces,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Prepends `text` as a literal, keeping the source string as `text:source`.
    fn prefixed(&self, text: &str) -> Self {
        let mut pieces = Vec::with_capacity(self.pieces.len() + 1);
        pieces.push(Piece::Literal(format!("{text}:")));
        pieces.extend(self.pieces.iter().cloned());
        Self {
            source: format!("{text}:{}", self.source),
            pieces,
        }
    }

    pub fn render(&self, record: &LogRecord) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field { field, width, left } => {
                    let value = field.render(record);
                    if *left {
                        out.push_str(&format!("{value:<width$}", width = *width));
                    } else {
                        out.push_str(&format!("{value:>width$}", width = *width));
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for FormatString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Renders a record into one log line.
pub trait LogFormatter: Send + fmt::Debug {
    fn format(&self, record: &LogRecord) -> String;

    /// The format string currently in effect.
    fn format_string(&self) -> &str;

    /// Formatters that accept a task prefix return themselves here.
    fn as_prefix_mut(&mut self) -> Option<&mut PrefixFormatter> {
        None
    }

    fn as_prefix(&self) -> Option<&PrefixFormatter> {
        None
    }
}

/// Formatter without prefix support. Task context injection skips it.
#[derive(Debug, Clone)]
pub struct PlainFormatter {
    fmt: FormatString,
}

impl PlainFormatter {
    pub fn new(fmt: &str) -> Result<Self, FormatError> {
        Ok(Self {
            fmt: FormatString::parse(fmt)?,
        })
    }
}

impl LogFormatter for PlainFormatter {
    fn format(&self, record: &LogRecord) -> String {
        self.fmt.render(record)
    }

    fn format_string(&self) -> &str {
        self.fmt.as_str()
    }
}

/// Formatter whose output can carry a per-run task prefix.
///
/// The effective format is always `prefix:base` or just `base`; applying a
/// new prefix discards the old one.
#[derive(Debug, Clone)]
pub struct PrefixFormatter {
    base: FormatString,
    prefix: Option<String>,
    effective: Option<FormatString>,
}

impl PrefixFormatter {
    pub fn new(base: &str) -> Result<Self, FormatError> {
        Ok(Self {
            base: FormatString::parse(base)?,
            prefix: None,
            effective: None,
        })
    }

    pub fn set_base_format(&mut self, fmt: &str) -> Result<(), FormatError> {
        self.base = FormatString::parse(fmt)?;
        self.effective = self.prefix.as_deref().map(|p| self.base.prefixed(p));
        Ok(())
    }

    pub fn apply_prefix(&mut self, prefix: &str) {
        self.effective = Some(self.base.prefixed(prefix));
        self.prefix = Some(prefix.to_string());
    }

    pub fn clear_prefix(&mut self) {
        self.prefix = None;
        self.effective = None;
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn base_format(&self) -> &str {
        self.base.as_str()
    }

    pub fn effective_format(&self) -> &str {
        self.effective.as_ref().unwrap_or(&self.base).as_str()
    }
}

impl LogFormatter for PrefixFormatter {
    fn format(&self, record: &LogRecord) -> String {
        self.effective.as_ref().unwrap_or(&self.base).render(record)
    }

    fn format_string(&self) -> &str {
        self.effective_format()
    }

    fn as_prefix_mut(&mut self) -> Option<&mut PrefixFormatter> {
        Some(self)
    }

    fn as_prefix(&self) -> Option<&PrefixFormatter> {
        Some(self)
    }
}
