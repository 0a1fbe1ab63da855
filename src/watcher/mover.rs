//! Relocation of handled files into the processed or failed directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("source file {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("copy of {destination} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        destination: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("copied to {destination} but could not remove the source: {source}")]
    SourceNotRemoved {
        destination: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MoveError {
    /// True when the destination holds a complete copy and only the
    /// source cleanup failed.
    pub fn is_data_safe(&self) -> bool {
        matches!(self, MoveError::SourceNotRemoved { .. })
    }
}

fn io_error(context: String) -> impl FnOnce(io::Error) -> MoveError {
    move |source| MoveError::Io { context, source }
}

/// Moves `source` into `destination_dir`, keeping its file name.
/// Returns the new path.
pub fn move_file(source: &Path, destination_dir: &Path) -> Result<PathBuf, MoveError> {
    move_file_with(source, destination_dir, |from, to| fs::rename(from, to))
}

/// [`move_file`] with a custom rename step.
///
/// An existing destination file is replaced. When `rename` fails (for
/// example across filesystems) the file is copied, synced, size-checked and
/// then the source is deleted.
pub fn move_file_with(
    source: &Path,
    destination_dir: &Path,
    rename: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> Result<PathBuf, MoveError> {
    if !source.is_file() {
        return Err(MoveError::SourceMissing(source.to_path_buf()));
    }

    fs::create_dir_all(destination_dir).map_err(io_error(format!(
        "Failed to create {}",
        destination_dir.display()
    )))?;

    let file_name = source.file_name().ok_or_else(|| MoveError::Io {
        context: format!("{} has no file name", source.display()),
        source: io::Error::from(io::ErrorKind::InvalidInput),
    })?;
    let destination = destination_dir.join(file_name);

    if destination == source {
        return Ok(destination);
    }

    if destination.exists() {
        fs::remove_file(&destination).map_err(io_error(format!(
            "Failed to replace existing {}",
            destination.display()
        )))?;
    }

    match rename(source, &destination) {
        Ok(()) => return Ok(destination),
        Err(e) => tracing::debug!(
            "Rename {} -> {} failed ({}), copying instead",
            source.display(),
            destination.display(),
            e
        ),
    }

    copy_verified(source, &destination)?;

    fs::remove_file(source).map_err(|e| MoveError::SourceNotRemoved {
        destination: destination.clone(),
        source: e,
    })?;

    Ok(destination)
}

/// Copies and fsyncs `source` to `destination`, removing the copy again if
/// anything goes wrong.
fn copy_verified(source: &Path, destination: &Path) -> Result<(), MoveError> {
    let result = (|| -> Result<(), MoveError> {
        let expected = fs::metadata(source)
            .map_err(io_error(format!("Failed to stat {}", source.display())))?
            .len();

        fs::copy(source, destination).map_err(io_error(format!(
            "Failed to copy {} to {}",
            source.display(),
            destination.display()
        )))?;

        let copy = File::open(destination)
            .map_err(io_error(format!("Failed to open {}", destination.display())))?;
        copy.sync_all()
            .map_err(io_error(format!("Failed to sync {}", destination.display())))?;
        let actual = copy
            .metadata()
            .map_err(io_error(format!("Failed to stat {}", destination.display())))?
            .len();

        if actual != expected {
            return Err(MoveError::SizeMismatch {
                destination: destination.to_path_buf(),
                expected,
                actual,
            });
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(destination);
    }
    result
}
