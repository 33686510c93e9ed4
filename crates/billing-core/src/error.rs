use std::path::PathBuf;
use thiserror::Error;

/// All file-level errors produced by the billing pipeline.
///
/// Row-level problems never surface here; malformed rows are skipped by the
/// parser and only show up as a gap between rows read and rows processed.
#[derive(Error, Debug)]
pub enum BillingError {
    /// The uploaded file does not carry a `.csv` extension.
    #[error("Please upload a CSV file (got {0})")]
    UnsupportedExtension(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file content is not valid UTF-8 text.
    #[error("Failed to decode file content: {0}")]
    Decode(String),

    /// The file contains no header or data lines.
    #[error("The file is empty")]
    EmptyFile,

    /// Parsing finished but no row landed in any service bucket.
    #[error("No billing data found in the file")]
    NoBillingData,

    /// The background parse job failed or was dropped.
    #[error("Error processing file: {0}")]
    Worker(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The CSV reader failed below the row level (e.g. an I/O fault).
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be produced or parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the billing crates.
pub type Result<T> = std::result::Result<T, BillingError>;
