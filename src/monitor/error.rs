//! Monitor error types.

use std::path::PathBuf;

use crate::shell::ShellError;
use crate::watcher::WatcherError;

/// Errors returned by [`InstanceMonitor`](super::InstanceMonitor) operations.
///
/// All of them end the current operation only; the monitor stays usable.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// `start` was called while a session is active or starting.
    #[error("An instance is already running")]
    AlreadyRunning,

    /// No player process was found after launching the client.
    #[error("Couldn't find the {0} process")]
    ProcessNotFound(String),

    /// No fresh log file appeared within the retry budget.
    #[error("Couldn't find a log file created less than {window_secs}s ago in {directory}")]
    LogFileNotFound {
        directory: PathBuf,
        window_secs: u64,
    },

    /// The operation needs a started instance.
    #[error("The instance hasn't been started yet")]
    NotStarted,

    /// `start` was aborted by a quit request.
    #[error("Start cancelled")]
    Cancelled,

    /// The launch URL is not a valid URL.
    #[error("Invalid launch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Shell command failure.
    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    /// Log reading or tailing failure.
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),
}
