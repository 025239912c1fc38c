//! Error types for field set parsing and manipulation

use std::fmt;
use thiserror::Error;

use crate::line_reader::LineReadError;

/// Which kind of entry an operation expected to find under a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A leaf string value
    Value,
    /// A nested field set
    Subset,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Value => f.write_str("value"),
            EntryKind::Subset => f.write_str("subset"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FieldSetError {
    /// The source was exhausted before a single line was read
    #[error("End of stream")]
    EndOfStream,

    #[error("Incomplete record: stream ended after {lines} line(s) without a terminator")]
    IncompleteRecord { lines: usize },

    #[error("Type conflict at {key:?}: expected a {expected}")]
    TypeConflict { key: String, expected: EntryKind },

    #[error("Not multi-level: {0}")]
    NotMultiLevel(String),

    #[error("Already contains {0:?}, cannot attach a subset there")]
    DuplicateKey(String),

    #[error("Corrupt structure: nesting depth {depth} exceeds limit {limit}")]
    CorruptStructure { depth: usize, limit: usize },

    #[error("Line source error: {0}")]
    Line(#[from] LineReadError),
}

impl FieldSetError {
    /// True for the clean "nothing left to read" condition
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FieldSetError::EndOfStream)
    }
}
