//! Pipeline configuration

use crate::error::{IndexError, Result};
use std::path::{Path, PathBuf};

// ============================================================================
// Defaults
// ============================================================================

/// Output root consumed by the web UI.
pub const DEFAULT_OUTPUT_DIR: &str = "public/data";

/// Number of preamble rows before the header in the published dataset.
pub const DEFAULT_HEADER_ROW: usize = 3;

/// Rows between two progress events.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 200_000;

/// Shard files written concurrently.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Delimited input file (`.gz` is decompressed on the fly)
    pub input: PathBuf,

    /// Output root; cleared and rebuilt on every successful stream
    pub output_dir: PathBuf,

    /// 0-based index of the header row; earlier rows are preamble
    pub header_row: usize,

    /// Field delimiter byte
    pub delimiter: u8,

    /// Emit a progress event every this many rows
    pub progress_interval: u64,

    /// Maximum number of shard writes in flight
    pub concurrency: usize,

    /// Draw a terminal spinner while streaming
    pub show_progress: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            header_row: DEFAULT_HEADER_ROW,
            delimiter: b',',
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
            show_progress: true,
        }
    }
}

impl IndexConfig {
    /// Create new config with builder pattern
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Validate configuration
    ///
    /// Besides the scalar checks this refuses output locations whose clearing
    /// would destroy the input or the whole filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(IndexError::config("Input path cannot be empty"));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(IndexError::config("Output directory cannot be empty"));
        }

        if !self.delimiter.is_ascii() || matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(IndexError::config(format!(
                "Unsupported delimiter {:?}",
                self.delimiter as char
            )));
        }

        if self.progress_interval == 0 {
            return Err(IndexError::config("Progress interval must be greater than 0"));
        }

        if self.concurrency == 0 {
            return Err(IndexError::config("Concurrency must be greater than 0"));
        }

        let output = resolve(&self.output_dir)?;
        if output.parent().is_none() {
            return Err(IndexError::config(format!(
                "Refusing to use filesystem root {} as output directory",
                output.display()
            )));
        }

        let input = resolve(&self.input)?;
        if input.starts_with(&output) {
            return Err(IndexError::config(format!(
                "Input {} lies inside output directory {}, which is cleared on every run",
                input.display(),
                output.display()
            )));
        }

        Ok(())
    }

    /// Location of the header row as reported in errors
    pub fn header_row_u64(&self) -> u64 {
        self.header_row as u64
    }
}

/// Canonical path when it exists, lexical absolute path otherwise.
fn resolve(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

/// Builder for IndexConfig
#[derive(Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn input(mut self, input: impl Into<PathBuf>) -> Self {
        self.config.input = input.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn header_row(mut self, row: usize) -> Self {
        self.config.header_row = row;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn progress_interval(mut self, rows: u64) -> Self {
        self.config.progress_interval = rows;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
