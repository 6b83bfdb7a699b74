//! # Prefix Templates
//!
//! `{{ expr }}` placeholders resolved against a [`TemplateContext`].
//! Everything outside the braces is copied verbatim.

use crate::context::TemplateContext;
use crate::error::TemplateError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed log prefix template. Read once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PrefixTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or(TemplateError::Unterminated {
                offset: offset + start,
            })?;
            let expr = after_open[..end].trim();
            if expr.is_empty() {
                return Err(TemplateError::EmptyPlaceholder {
                    offset: offset + start,
                });
            }
            segments.push(Segment::Placeholder(expr.to_string()));

            let consumed = start + 2 + end + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Placeholder expressions in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, ctx: &dyn TemplateContext) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(path) => {
                    let value =
                        ctx.lookup(path)
                            .ok_or_else(|| TemplateError::UnresolvedPlaceholder {
                                placeholder: path.clone(),
                            })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for PrefixTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PrefixTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
