//! Fieldset Core
//!
//! Hierarchical key/value records exchanged between overlay nodes: parsing
//! from bounded line streams, storage, queries, and serialization.

pub mod config;
pub mod error;
pub mod fieldset;
pub mod iter;
pub mod line_reader;
pub mod parser;
pub mod runtime;

pub use config::{Cli, Command, Config, ConfigError};
pub use error::{EntryKind, FieldSetError};
pub use fieldset::{
    Entry, FieldSet, DEFAULT_END_MARKER, MAX_NESTING_DEPTH, MULTI_LEVEL_CHAR, VALUE_SEPARATOR,
};
pub use iter::{LeafValues, DEFAULT_MAX_DEPTH};
pub use line_reader::{
    AsyncBoundedLineReader, BoundedLineReader, LineReadError, LineSource, ReadLimits,
    DEFAULT_LINE_BUFFER_SIZE, DEFAULT_MAX_LINE_LENGTH,
};
pub use parser::RecordParser;
pub use runtime::{next_record, read_records, run_command, RuntimeError};
