//! Bounded line sources
//!
//! Field sets arrive over untrusted streams, so every line read is capped
//! at a maximum length. Both readers strip the `\n` (or `\r\n`) terminator
//! and decode the line as UTF-8.

use std::io::{self, BufRead};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Default maximum length of a single line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Default initial capacity of the line buffer, in bytes
pub const DEFAULT_LINE_BUFFER_SIZE: usize = 128;

#[derive(Error, Debug)]
pub enum LineReadError {
    #[error("Line exceeds maximum length of {limit} bytes")]
    TooLong { limit: usize },

    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Limits applied to every line pulled from a [`LineSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    pub max_line_length: usize,
    pub buffer_size: usize,
}

impl ReadLimits {
    pub fn new(max_line_length: usize, buffer_size: usize) -> Self {
        Self {
            max_line_length,
            buffer_size,
        }
    }

    /// Limits for trusted in-memory input
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, DEFAULT_LINE_BUFFER_SIZE)
    }
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH, DEFAULT_LINE_BUFFER_SIZE)
    }
}

/// A source of bounded-length lines
pub trait LineSource {
    /// Read the next line without its terminator
    ///
    /// Returns:
    /// - `Ok(Some(line))` - Next line (the last line may lack a trailing newline)
    /// - `Ok(None)` - End of stream, nothing left to read
    /// - `Err(LineReadError)` - Line too long, invalid UTF-8, or IO failure
    fn read_line(
        &mut self,
        max_line_length: usize,
        buffer_size: usize,
    ) -> Result<Option<String>, LineReadError>;
}

/// Accumulates the bytes of one line while enforcing the length limit
struct LineBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    fn new(max_line_length: usize, buffer_size: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(buffer_size.min(max_line_length)),
            limit: max_line_length,
        }
    }

    /// Take bytes up to and including the next newline.
    ///
    /// Returns the number of bytes consumed and whether the line is complete.
    fn feed(&mut self, available: &[u8]) -> Result<(usize, bool), LineReadError> {
        match available.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                self.extend(&available[..idx])?;
                Ok((idx + 1, true))
            }
            None => {
                self.extend(available)?;
                Ok((available.len(), false))
            }
        }
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), LineReadError> {
        // A trailing '\r' is stripped later and does not count against the limit
        let pending = self.bytes.len() + bytes.len();
        let content = match bytes.last().or(self.bytes.last()) {
            Some(b'\r') => pending - 1,
            _ => pending,
        };
        if content > self.limit {
            return Err(LineReadError::TooLong { limit: self.limit });
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(mut self) -> Result<String, LineReadError> {
        if self.bytes.last() == Some(&b'\r') {
            self.bytes.pop();
        }
        String::from_utf8(self.bytes).map_err(|_| LineReadError::InvalidUtf8)
    }
}

/// Blocking line source over any [`BufRead`]
pub struct BoundedLineReader<R> {
    reader: R,
}

impl<R: BufRead> BoundedLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> LineSource for BoundedLineReader<R> {
    fn read_line(
        &mut self,
        max_line_length: usize,
        buffer_size: usize,
    ) -> Result<Option<String>, LineReadError> {
        let mut line = LineBuffer::new(max_line_length, buffer_size);
        let mut started = false;

        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return if started { line.finish().map(Some) } else { Ok(None) };
            }
            started = true;

            let (used, complete) = line.feed(available)?;
            self.reader.consume(used);
            if complete {
                return line.finish().map(Some);
            }
        }
    }
}

/// Async line source over any tokio [`AsyncBufRead`]
pub struct AsyncBoundedLineReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> AsyncBoundedLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Async counterpart of [`LineSource::read_line`], with the same contract
    pub async fn read_line(
        &mut self,
        max_line_length: usize,
        buffer_size: usize,
    ) -> Result<Option<String>, LineReadError> {
        let mut line = LineBuffer::new(max_line_length, buffer_size);
        let mut started = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return if started { line.finish().map(Some) } else { Ok(None) };
            }
            started = true;

            let (used, complete) = line.feed(available)?;
            self.reader.consume(used);
            if complete {
                return line.finish().map(Some);
            }
        }
    }
}
