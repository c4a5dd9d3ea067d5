//! Citation values and their canonical `[path:start-end]` form
//!
//! Citations are plain values. [`Citation::new`] enforces
//! `end_line >= start_line >= 1`; the fields themselves may carry out-of-range
//! numbers so that a malformed citation taken verbatim from a report can still
//! be reported precisely by the validator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A reference to an inclusive, 1-indexed line range of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Citation {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Citation {
    /// Create a well-formed citation.
    pub fn new(file_path: impl Into<String>, start_line: u32, end_line: u32) -> Result<Self> {
        let file_path = file_path.into();
        if file_path.is_empty() {
            return Err(EngineError::InvalidCitation("empty file path".into()));
        }
        if start_line == 0 {
            return Err(EngineError::InvalidLineRange {
                start: start_line,
                end: end_line,
                reason: "line numbers must be positive".into(),
            });
        }
        if end_line < start_line {
            return Err(EngineError::InvalidLineRange {
                start: start_line,
                end: end_line,
                reason: "start_line > end_line".into(),
            });
        }
        Ok(Self {
            file_path,
            start_line,
            end_line,
        })
    }

    /// Parse `path:start-end`, with or without surrounding brackets.
    ///
    /// The path is split from the range on the last `:` so Windows-style
    /// drive prefixes and other colons in the path survive.
    pub fn parse(input: &str) -> Result<Self> {
        let inner = input
            .trim()
            .strip_prefix('[')
            .unwrap_or(input.trim());
        let inner = inner.strip_suffix(']').unwrap_or(inner);

        let (path, range) = inner.rsplit_once(':').ok_or_else(|| {
            EngineError::InvalidCitation(format!("missing colon in '{inner}'"))
        })?;

        let (start, end) = parse_line_range(range).ok_or_else(|| {
            EngineError::InvalidCitation(format!(
                "expected numeric 'start-end' in '{inner}'"
            ))
        })?;

        Self::new(path, start, end)
    }

    /// Number of lines covered, counting a zero start as line 1.
    /// Zero for an inverted range.
    pub fn line_span(&self) -> u32 {
        let start = self.start_line.max(1);
        if self.end_line < start {
            0
        } else {
            (self.end_line - start).saturating_add(1)
        }
    }

    /// Whether `end_line >= start_line >= 1` holds.
    pub fn is_well_formed(&self) -> bool {
        self.start_line >= 1 && self.end_line >= self.start_line && !self.file_path.is_empty()
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}-{}]", self.file_path, self.start_line, self.end_line)
    }
}

impl FromStr for Citation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse a `start-end` range into numbers without checking their order.
pub(crate) fn parse_line_range(range: &str) -> Option<(u32, u32)> {
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse::<u32>().ok()?;
    let end = end.trim().parse::<u32>().ok()?;
    Some((start, end))
}
