//! Configuration management for the fieldset tool
//!
//! Handles CLI argument parsing, config file loading, and defaults.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::iter::DEFAULT_MAX_DEPTH;
use crate::line_reader::{ReadLimits, DEFAULT_LINE_BUFFER_SIZE, DEFAULT_MAX_LINE_LENGTH};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Parser, Debug)]
#[command(name = "fieldset")]
#[command(about = "Inspect hierarchical field set records", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML config file; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Maximum length of a single record line in bytes
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Initial line buffer size in bytes
    #[arg(long)]
    pub line_buffer_size: Option<usize>,

    /// Treat '.' in keys literally instead of as a nesting separator
    #[arg(long)]
    pub flat: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-serialize every record in a file
    Dump {
        /// Input file, or '-' for stdin
        path: PathBuf,

        /// Emit records as a JSON array instead of the text format
        #[arg(long)]
        json: bool,
    },

    /// Print the value stored under a key in each record
    Get {
        path: PathBuf,
        key: String,

        /// Split accumulated values and print one per line
        #[arg(long)]
        all: bool,
    },

    /// Print the nested field set under a key in each record
    Subset { path: PathBuf, key: String },

    /// Print every leaf value, depth first
    Leaves { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub max_line_length: usize,
    pub line_buffer_size: usize,
    pub multi_level: bool,
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            line_buffer_size: DEFAULT_LINE_BUFFER_SIZE,
            multi_level: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    /// Parse CLI arguments into a config and the command to run
    pub fn from_cli() -> Result<(Self, Command), ConfigError> {
        Self::from_parsed(Cli::parse())
    }

    /// Build config from already-parsed arguments, loading `--config` if given
    pub fn from_parsed(cli: Cli) -> Result<(Self, Command), ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        if let Some(level) = cli.log_level {
            config.log_level = level;
        }
        if let Some(len) = cli.max_line_length {
            config.max_line_length = len;
        }
        if let Some(size) = cli.line_buffer_size {
            config.line_buffer_size = size;
        }
        if cli.flat {
            config.multi_level = false;
        }

        config.validate()?;
        Ok((config, cli.command))
    }

    /// Load config from TOML file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be greater than 0".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits::new(self.max_line_length, self.line_buffer_size)
    }
}
