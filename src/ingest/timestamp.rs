//! Capture time resolution for screenshots.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digit run pattern"));

/// `yyyyMMddHHmmss`, as Clone Hero writes it into screenshot names.
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_DIGITS: usize = 14;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("no 14-digit timestamp in file name {0:?}")]
    NotFound(String),
    #[error("invalid timestamp {digits:?} in file name: {source}")]
    Invalid {
        digits: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Parses the first run of exactly 14 digits in the file's base name as a
/// UTC `yyyyMMddHHmmss` timestamp.
///
/// Longer digit runs are skipped rather than sliced: in
/// `shot-202512120522310-20251212052231.png` the 15-digit run is ignored
/// and the second run is used. A plain 14-digit substring search would
/// instead take the first 14 digits of the longer run.
pub fn parse_timestamp_from_filename(file_name: &str) -> Result<DateTime<Utc>, TimestampError> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let digits = DIGIT_RUN
        .find_iter(&stem)
        .map(|m| m.as_str())
        .find(|run| run.len() == TIMESTAMP_DIGITS)
        .ok_or_else(|| TimestampError::NotFound(file_name.to_string()))?;

    NaiveDateTime::parse_from_str(digits, FILENAME_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|source| TimestampError::Invalid {
            digits: digits.to_string(),
            source,
        })
}

/// Returns when the screenshot was taken: the file name timestamp when
/// present, otherwise the file's modification time.
///
/// Only an unreadable file is an error.
pub fn resolve_created_at(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match parse_timestamp_from_filename(&file_name) {
        Ok(created_at) => Ok(created_at),
        Err(e) => {
            tracing::debug!("{}, using modification time for {}", e, path.display());
            let modified = std::fs::metadata(path)?.modified()?;
            Ok(DateTime::<Utc>::from(modified))
        }
    }
}
