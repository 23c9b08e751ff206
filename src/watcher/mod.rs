//! Log watching: locate the client log, tail it, and classify new lines.

mod classifier;
mod error;
mod locator;
mod reader;
mod tail;

pub use classifier::{GameEventInfo, LineClassifier, Rule, RuleError};
pub use error::{LocateError, WatcherError};
pub use locator::{find_latest_file, FileStat, FsStat, LogFileLocator};
pub use reader::{diff, normalize, normalize_bytes, IncrementalReader};
pub use tail::{
    stale_tail_pattern, tail_args, ChangeHandler, ProcessingGuard, ProcessingPermit, TailState,
    TailWatcher, DEFAULT_RESTART_DELAY,
};
