//! Watcher error types.

use std::path::PathBuf;

use crate::shell::ShellError;

/// Errors that can occur while reading or tailing the log file.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Watched file was deleted.
    #[error("Watched file deleted: {0}")]
    FileDeleted(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The tail watcher was started while already running.
    #[error("Tail watcher already running")]
    AlreadyTailing,

    /// Shell or process spawning failure.
    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// Classify an I/O error raised while accessing `path`.
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileDeleted(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Errors from [`LogFileLocator`](super::LogFileLocator).
#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    /// No file in the directory was fresh enough within the attempt budget.
    #[error("No log file created less than {window_secs}s ago in {directory} after {attempts} attempts")]
    NoFreshLogFound {
        directory: PathBuf,
        attempts: u32,
        window_secs: u64,
    },

    /// The search was cancelled before it finished.
    #[error("Log file search cancelled")]
    Cancelled,
}
