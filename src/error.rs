// Failure taxonomy for parsing, scoping and aggregation.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SheeError>;

#[derive(thiserror::Error, Debug)]
pub enum SheeError {
    // Open is the error when a capture file cannot be read at all.
    #[error("cannot open capture {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // TimeConversion is the error when the epoch column is missing or not a unix timestamp.
    #[error("epoch conversion failed for {}: {reason}", path.display())]
    TimeConversion { path: PathBuf, reason: String },

    // ColumnNormalization is the error when the two-row header cannot yield unique labels.
    #[error("column normalization failed for {}: {reason}", path.display())]
    ColumnNormalization { path: PathBuf, reason: String },

    // UnknownColumn is the error when a family, device or sub-metric is absent from a table.
    #[error("column {column} not found in {origin}")]
    UnknownColumn { origin: String, column: String },

    // NoOverlap is the error when no capture survives the overlap filter.
    #[error("no time-overlapping captures among {captures} input(s)")]
    NoOverlap { captures: usize },

    // InvalidComparison is the error when a comparison names fewer than two or more than three families.
    #[error("comparison needs 2 or 3 metric families, got {requested}")]
    InvalidComparison { requested: usize },

    // WindowInput is the error when the time window prompt can no longer supply answers.
    #[error("time window input: {0}")]
    WindowInput(#[from] std::io::Error),

    // Export is the error when an aggregate table cannot be written out.
    #[error("export to {} failed: {reason}", path.display())]
    Export { path: PathBuf, reason: String },

    // Import is the error when a saved aggregate table cannot be read back.
    #[error("saved aggregate {} unreadable: {reason}", path.display())]
    Import { path: PathBuf, reason: String },
}

impl SheeError {
    pub(crate) fn unknown_column(origin: &str, column: impl Into<String>) -> Self {
        SheeError::UnknownColumn {
            origin: origin.to_string(),
            column: column.into(),
        }
    }
}
