//! Incremental log reader.
//!
//! Keeps the full text already processed and reports lines that did not
//! appear in it. The baseline is content, not a byte offset, so the reader
//! survives the client rewriting or re-encoding its log.

use std::path::{Path, PathBuf};

use super::error::WatcherError;

/// Read `path` and re-encode it as UTF-8, dropping invalid byte sequences.
///
/// # Errors
///
/// Returns `WatcherError::FileDeleted` or `WatcherError::PermissionDenied`
/// for the corresponding I/O failures, `WatcherError::Io` otherwise.
pub async fn normalize(path: &Path) -> Result<String, WatcherError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| WatcherError::from_io(path, e))?;
    Ok(normalize_bytes(&bytes))
}

/// Keep only the valid UTF-8 runs of `bytes`.
#[must_use]
pub fn normalize_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Lines of `content` that do not occur anywhere in `previous`.
///
/// Containment is a substring test against the whole previous text, so a
/// line identical to one already seen is never reported again.
#[must_use]
pub fn diff(content: &str, previous: &str) -> Vec<String> {
    content
        .split('\n')
        .filter(|line| !previous.contains(line))
        .map(str::to_string)
        .collect()
}

/// Content-baseline reader for a single log file.
#[derive(Debug)]
pub struct IncrementalReader {
    path: PathBuf,
    snapshot: String,
}

impl IncrementalReader {
    /// Create a reader with an empty baseline.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            snapshot: String::new(),
        }
    }

    /// Get the path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current baseline.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    /// Read the whole file, make it the baseline and return all its lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn seed(&mut self) -> Result<Vec<String>, WatcherError> {
        let content = normalize(&self.path).await?;
        let lines = content.split('\n').map(str::to_string).collect();
        self.snapshot = content;
        Ok(lines)
    }

    /// Read the file and return lines not present in the baseline.
    ///
    /// The baseline is replaced by the full current content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read. The baseline is left
    /// untouched in that case.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, WatcherError> {
        let content = normalize(&self.path).await?;
        let lines = diff(&content, &self.snapshot);
        self.snapshot = content;
        Ok(lines)
    }
}
