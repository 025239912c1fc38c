//! Record parsing from bounded line streams
//!
//! Format:
//!
//! ```text
//! blah=blah
//! blah.sub=blah
//! End
//! ```
//!
//! Each line is split at its first `=`. The first line without `=`
//! terminates the record and is kept verbatim as its end marker, so a blank
//! line also ends a record.

use tokio::io::AsyncBufRead;
use tracing::{debug, trace};

use crate::error::FieldSetError;
use crate::fieldset::{FieldSet, VALUE_SEPARATOR};
use crate::line_reader::{AsyncBoundedLineReader, BoundedLineReader, LineSource, ReadLimits};

/// Line-fed record assembler shared by the blocking and async readers
pub struct RecordParser {
    fields: FieldSet,
    lines: usize,
}

impl RecordParser {
    pub fn new(multi_level: bool) -> Self {
        Self {
            fields: FieldSet::new(multi_level),
            lines: 0,
        }
    }

    /// Number of lines consumed so far, terminator included
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Apply one line. Returns `true` once the terminator has been seen.
    pub fn feed(&mut self, line: String) -> Result<bool, FieldSetError> {
        self.lines += 1;
        match line.split_once('=') {
            Some((key, value)) => {
                self.fields.put(key, value)?;
                Ok(false)
            }
            None => {
                trace!(
                    "Record terminated by {:?} after {} line(s)",
                    line,
                    self.lines
                );
                self.fields.set_end_marker(line);
                Ok(true)
            }
        }
    }

    /// The error to report when the source runs dry before a terminator
    pub fn finish_at_end_of_stream(self) -> FieldSetError {
        if self.lines == 0 {
            FieldSetError::EndOfStream
        } else {
            debug!(
                "Stream ended after {} line(s) without a terminator",
                self.lines
            );
            FieldSetError::IncompleteRecord { lines: self.lines }
        }
    }

    pub fn into_field_set(self) -> FieldSet {
        self.fields
    }
}

impl FieldSet {
    /// Read one record from a bounded line source
    pub fn read_from<S: LineSource>(
        source: &mut S,
        limits: ReadLimits,
        multi_level: bool,
    ) -> Result<FieldSet, FieldSetError> {
        let mut parser = RecordParser::new(multi_level);
        loop {
            match source.read_line(limits.max_line_length, limits.buffer_size)? {
                Some(line) => {
                    if parser.feed(line)? {
                        return Ok(parser.into_field_set());
                    }
                }
                None => return Err(parser.finish_at_end_of_stream()),
            }
        }
    }

    /// Read one record from an async bounded line source
    pub async fn read_from_async<R: AsyncBufRead + Unpin>(
        source: &mut AsyncBoundedLineReader<R>,
        limits: ReadLimits,
        multi_level: bool,
    ) -> Result<FieldSet, FieldSetError> {
        let mut parser = RecordParser::new(multi_level);
        loop {
            match source
                .read_line(limits.max_line_length, limits.buffer_size)
                .await?
            {
                Some(line) => {
                    if parser.feed(line)? {
                        return Ok(parser.into_field_set());
                    }
                }
                None => return Err(parser.finish_at_end_of_stream()),
            }
        }
    }

    /// Parse a record from a string
    ///
    /// Fails with `EndOfStream` on empty input and `IncompleteRecord` if
    /// the string has no terminator line.
    pub fn parse_str(content: &str, multi_level: bool) -> Result<FieldSet, FieldSetError> {
        let mut source = BoundedLineReader::new(content.as_bytes());
        Self::read_from(&mut source, ReadLimits::unbounded(), multi_level)
    }

    /// Parse a record from fragments, each followed by `;`
    ///
    /// The fragments are joined into one buffer and parsed as a single
    /// stream, so they must carry their own newlines and terminator.
    pub fn from_fragments<S: AsRef<str>>(
        fragments: &[S],
        multi_level: bool,
    ) -> Result<FieldSet, FieldSetError> {
        let total: usize = fragments.iter().map(|f| f.as_ref().len() + 1).sum();
        let mut content = String::with_capacity(total);
        for fragment in fragments {
            content.push_str(fragment.as_ref());
            content.push(VALUE_SEPARATOR);
        }
        Self::parse_str(&content, multi_level)
    }
}
