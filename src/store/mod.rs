//! Score persistence.

pub mod csv_writer;

pub use csv_writer::CsvScoreStore;

use std::path::PathBuf;
use thiserror::Error;

use crate::ingest::record::ScoreRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("score log {path} I/O failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("score log {path} CSV error: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A persisted score with the id it was assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredScore {
    pub id: i64,
    pub record: ScoreRecord,
}

/// Destination for extracted scores.
pub trait ScoreStore: Send + Sync {
    /// Persists one record, returning its new id. Either the whole record
    /// is stored or nothing is.
    fn create_score(&self, record: &ScoreRecord) -> Result<i64, StoreError>;
}
