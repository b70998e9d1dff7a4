//! Writing partial copies to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("output path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { bytes: usize },
    /// The file already held identical content and was left untouched.
    Unchanged,
}

/// Write `content` to `path` unless the file on disk already has the same xxh3 digest.
pub fn write_if_changed(path: &Path, content: &str) -> Result<WriteOutcome, OutputError> {
    if let Ok(existing) = fs::read(path) {
        if xxh3_64(&existing) == xxh3_64(content.as_bytes()) {
            return Ok(WriteOutcome::Unchanged);
        }
    }
    atomic_write(path, content.as_bytes())?;
    Ok(WriteOutcome::Written {
        bytes: content.len(),
    })
}

/// Atomic file write: tempfile + fsync + rename. Missing parent directories are created.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), OutputError> {
    let parent = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => return Err(OutputError::NoParent(path.to_path_buf())),
    };
    let io = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(parent).map_err(io)?;

    // Same directory keeps the rename on one filesystem
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io)?;
    temp.write_all(content).map_err(io)?;
    temp.as_file().sync_all().map_err(io)?;
    temp.persist(path).map_err(|e| io(e.error))?;

    Ok(())
}
