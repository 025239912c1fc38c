//! Command execution for the fieldset tool
//!
//! Opens the input, reads every record in it back-to-back and runs the
//! requested command against them.

use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{debug, info};

use crate::config::{Command, Config};
use crate::error::FieldSetError;
use crate::fieldset::FieldSet;
use crate::line_reader::{AsyncBoundedLineReader, ReadLimits};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Field set error: {0}")]
    FieldSet(#[from] FieldSetError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key not found in any record: {0}")]
    NotFound(String),
}

/// Read the next record, or `None` once the source is cleanly exhausted
///
/// A truncated record is an error.
pub async fn next_record<R: AsyncBufRead + Unpin>(
    source: &mut AsyncBoundedLineReader<R>,
    limits: ReadLimits,
    multi_level: bool,
) -> Result<Option<FieldSet>, FieldSetError> {
    match FieldSet::read_from_async(source, limits, multi_level).await {
        Ok(fs) => Ok(Some(fs)),
        Err(e) if e.is_end_of_stream() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read records until the source is exhausted
pub async fn read_records<R: AsyncBufRead + Unpin>(
    source: &mut AsyncBoundedLineReader<R>,
    limits: ReadLimits,
    multi_level: bool,
) -> Result<Vec<FieldSet>, FieldSetError> {
    let mut records = Vec::new();
    while let Some(fs) = next_record(source, limits, multi_level).await? {
        records.push(fs);
    }
    Ok(records)
}

async fn open_input(path: &Path) -> io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == Path::new("-") {
        Ok(Box::new(BufReader::new(tokio::io::stdin())))
    } else {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Write one record's share of a command's output.
///
/// Returns whether the record matched the command's key.
fn write_record<W: Write>(
    config: &Config,
    command: &Command,
    record: &FieldSet,
    out: &mut W,
) -> Result<bool, RuntimeError> {
    match command {
        Command::Dump { .. } => {
            record.write_to(out)?;
            Ok(true)
        }
        Command::Get { key, all: true, .. } => match record.get_all(key) {
            Some(values) => {
                for value in values {
                    writeln!(out, "{value}")?;
                }
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Get { key, all: false, .. } => match record.get(key) {
            Some(value) => {
                writeln!(out, "{value}")?;
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Subset { key, .. } => match record.subset(key)? {
            Some(subset) => {
                subset.write_to(out)?;
                Ok(true)
            }
            None => Ok(false),
        },
        Command::Leaves { .. } => {
            for value in record.leaf_values().with_max_depth(config.max_depth) {
                writeln!(out, "{}", value?)?;
            }
            Ok(true)
        }
    }
}

/// Run a command, writing its output to `out`
///
/// Records are processed as they are read, except for JSON output which
/// needs the whole array.
pub async fn run_command<W: Write>(
    config: &Config,
    command: &Command,
    out: &mut W,
) -> Result<(), RuntimeError> {
    let path = match command {
        Command::Dump { path, .. }
        | Command::Get { path, .. }
        | Command::Subset { path, .. }
        | Command::Leaves { path } => path,
    };
    info!("Reading records from {}", path.display());

    let mut source = AsyncBoundedLineReader::new(open_input(path).await?);
    let limits = config.read_limits();

    if let Command::Dump { json: true, .. } = command {
        let records = read_records(&mut source, limits, config.multi_level).await?;
        info!("Read {} record(s)", records.len());
        serde_json::to_writer_pretty(&mut *out, &records)?;
        writeln!(out)?;
        out.flush()?;
        return Ok(());
    }

    let mut count = 0;
    let mut matched = 0;
    while let Some(record) = next_record(&mut source, limits, config.multi_level).await? {
        count += 1;
        debug!(
            "Read record #{} with {} top-level entries",
            count,
            record.len()
        );
        if write_record(config, command, &record, out)? {
            matched += 1;
        }
    }
    out.flush()?;
    info!("Processed {} record(s)", count);

    match command {
        Command::Get { key, .. } | Command::Subset { key, .. } if matched == 0 => {
            Err(RuntimeError::NotFound(key.clone()))
        }
        _ => Ok(()),
    }
}
