//! Storage Layer
//!
//! Flat-file persistence for the prediction history log. Rows are CSV with a
//! header; appends never rewrite existing rows.

pub mod analytics;
mod atomic;
mod history;
mod schema;

pub use analytics::{Distribution, Summary, TrendPoint};
pub use atomic::write_atomic;
pub use history::{export_csv, HistoryIter, HistoryLog, MigrationReport, PredictionRecord};
pub use schema::canonical_header;

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("History schema mismatch, missing columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("Corrupt history row {line}: {reason}")]
    CorruptRow { line: u64, reason: String },
    #[error("Export failed: {0}")]
    Export(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
