//! Error types for the index pipeline
//!
//! Messages are operator-facing: they say what went wrong and, where it helps,
//! what to check.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error type for the CSV-to-index pipeline
#[derive(Error, Debug)]
pub enum IndexError {
    /// Required columns are absent from the header row
    #[error("Required columns missing from header row {row}: {}. Check that the input has the expected header at this row (see --header-row).", .missing.join(", "))]
    MissingColumns { row: u64, missing: Vec<String> },

    /// The input ended before the header row was reached
    #[error("Input ended after {rows_read} rows, before header row {header_row}. Check --header-row and the input file.")]
    HeaderNotFound { header_row: u64, rows_read: u64 },

    /// The input file could not be opened
    #[error("Cannot open input {}: {source}. Verify the file path exists and you have read permissions.", .path.display())]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or decoding the input failed mid-stream
    #[error("Failed to read input at row {row}: {source}")]
    Input {
        row: u64,
        #[source]
        source: csv::Error,
    },

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Shard serialization failed
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),
}

impl IndexError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is a schema problem with the input header
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::MissingColumns { .. } | Self::HeaderNotFound { .. })
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(e: tokio::task::JoinError) -> Self {
        IndexError::Task(e.to_string())
    }
}
