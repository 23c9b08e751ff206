//! Log file discovery.
//!
//! Finds the newest file in the client's log directory and only accepts it
//! once it is young enough to belong to the current client session.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::LocateError;
use crate::config::LocatorConfig;
use crate::timer::sleep_or_cancel;

/// File creation time lookup.
#[async_trait]
pub trait FileStat: Send + Sync {
    /// When `path` was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    async fn created_at(&self, path: &Path) -> std::io::Result<SystemTime>;
}

/// [`FileStat`] reading filesystem metadata.
///
/// Falls back to the modification time on filesystems without birth time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStat;

#[async_trait]
impl FileStat for FsStat {
    async fn created_at(&self, path: &Path) -> std::io::Result<SystemTime> {
        let metadata = tokio::fs::metadata(path).await?;
        metadata.created().or_else(|_| metadata.modified())
    }
}

/// Find the most recently modified file in a directory.
///
/// Subdirectories are ignored. Returns `None` if the directory holds no
/// files or cannot be read.
pub async fn find_latest_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot read log directory");
            return None;
        }
    };

    let mut latest: Option<(PathBuf, SystemTime)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if latest.as_ref().map_or(true, |(_, newest)| modified > *newest) {
            latest = Some((entry.path(), modified));
        }
    }

    latest.map(|(path, _)| path)
}

/// Retrying search for a fresh log file.
#[derive(Debug, Clone)]
pub struct LogFileLocator<S = FsStat> {
    config: LocatorConfig,
    stat: S,
}

impl LogFileLocator<FsStat> {
    /// Create a locator that reads real file metadata.
    #[must_use]
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            stat: FsStat,
        }
    }
}

impl<S: FileStat> LogFileLocator<S> {
    /// Create a locator with a custom stat source.
    #[must_use]
    pub fn with_stat(config: LocatorConfig, stat: S) -> Self {
        Self { config, stat }
    }

    /// Get the locator configuration.
    #[must_use]
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Check once whether the newest file in `directory` is fresh.
    async fn check(&self, directory: &Path, window: Duration) -> Option<PathBuf> {
        let latest = find_latest_file(directory).await?;
        let created_at = match self.stat.created_at(&latest).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(path = %latest.display(), error = %e, "Cannot stat log file");
                return None;
            }
        };
        // A creation time in the future counts as age zero.
        let age = SystemTime::now()
            .duration_since(created_at)
            .unwrap_or(Duration::ZERO);

        (age < window).then_some(latest)
    }

    /// Locate the current log file in `directory`.
    ///
    /// Makes at most `max_attempts` checks, sleeping `delay_seconds` after
    /// each failed one.
    ///
    /// # Errors
    ///
    /// Returns `LocateError::NoFreshLogFound` once the attempt budget is
    /// spent, or `LocateError::Cancelled` if `cancel` fires during a wait.
    pub async fn locate(
        &self,
        directory: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, LocateError> {
        let window = self.config.freshness_window();
        let delay = self.config.delay();
        let mut remaining = self.config.max_attempts;

        while remaining > 0 {
            if cancel.is_cancelled() {
                return Err(LocateError::Cancelled);
            }

            if let Some(path) = self.check(directory, window).await {
                tracing::info!(path = %path.display(), "Found latest log file");
                return Ok(path);
            }

            remaining -= 1;
            tracing::info!(
                directory = %directory.display(),
                remaining,
                "No fresh log file yet, retrying"
            );

            if remaining > 0 && !sleep_or_cancel(delay, cancel).await {
                return Err(LocateError::Cancelled);
            }
        }

        Err(LocateError::NoFreshLogFound {
            directory: directory.to_path_buf(),
            attempts: self.config.max_attempts,
            window_secs: self.config.freshness_window_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Stat source reporting a fixed age and counting calls.
    struct AgedStat {
        age: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FileStat for AgedStat {
        async fn created_at(&self, _path: &Path) -> std::io::Result<SystemTime> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SystemTime::now() - self.age)
        }
    }

    fn config(attempts: u32, delay: u64) -> LocatorConfig {
        LocatorConfig {
            freshness_window_seconds: 15,
            max_attempts: attempts,
            delay_seconds: delay,
        }
    }

    fn aged(age_secs: u64) -> (AgedStat, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            AgedStat {
                age: Duration::from_secs(age_secs),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_find_latest_file_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_latest_file(temp_dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_find_latest_file_ignores_directories() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("archive")).unwrap();
        assert!(find_latest_file(temp_dir.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_find_latest_file_picks_newest() {
        let temp_dir = TempDir::new().unwrap();
        let old_path = temp_dir.path().join("old_Player.log");
        std::fs::write(&old_path, "old").unwrap();

        std::thread::sleep(Duration::from_millis(20));

        let new_path = temp_dir.path().join("new_Player.log");
        std::fs::write(&new_path, "new").unwrap();

        assert_eq!(find_latest_file(temp_dir.path()).await, Some(new_path));
    }

    #[tokio::test]
    async fn test_locate_stale_file_fails_after_exact_attempts() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Player.log"), "x").unwrap();

        let (stat, calls) = aged(20);
        let locator = LogFileLocator::with_stat(config(2, 0), stat);
        let result = locator
            .locate(temp_dir.path(), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(LocateError::NoFreshLogFound { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_locate_fresh_file_succeeds_first_check() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Player.log");
        std::fs::write(&path, "x").unwrap();

        let (stat, calls) = aged(1);
        let locator = LogFileLocator::with_stat(config(10, 1), stat);
        let found = locator
            .locate(temp_dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found, path);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_locate_empty_dir_spends_budget() {
        let temp_dir = TempDir::new().unwrap();
        let (stat, calls) = aged(0);
        let locator = LogFileLocator::with_stat(config(3, 0), stat);

        let result = locator
            .locate(temp_dir.path(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(LocateError::NoFreshLogFound { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_locate_cancelled_during_wait() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Player.log"), "x").unwrap();

        let (stat, _calls) = aged(60);
        let locator = LogFileLocator::with_stat(config(10, 30), stat);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            locator.locate(temp_dir.path(), &cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(LocateError::Cancelled)));
    }

    #[tokio::test]
    async fn test_locate_with_real_metadata_accepts_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Player.log");
        std::fs::write(&path, "x").unwrap();

        let locator = LogFileLocator::new(config(1, 0));
        let found = locator
            .locate(temp_dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, path);
    }
}
