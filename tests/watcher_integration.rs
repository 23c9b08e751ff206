//! Integration tests for locating, reading and classifying client logs.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use roblox_monitor::config::{ConfigLoader, LocatorConfig};
use roblox_monitor::watcher::{
    normalize, FileStat, GameEventInfo, IncrementalReader, LineClassifier, LocateError,
    LogFileLocator, WatcherError,
};

const SESSION_LOG: &[&str] = &[
    "2024-05-01T10:00:00.001Z,0.1,1,6 [FLog::SingleSurfaceApp] launchUGCGameInternal",
    "2024-05-01T10:00:00.002Z,0.1,1,6 [FLog::Output] ! Joining game '0b9c7c57-1a2b-4c3d-9e8f-0123456789ab' place 1818 at 10.0.0.5",
    "2024-05-01T10:00:00.003Z,0.1,1,6 [FLog::Network] UDMUX Address = 128.116.1.2, Port = 53640 | RCC Server Address = 10.0.0.9, Port = 53640",
    "2024-05-01T10:00:00.004Z,0.1,1,6 [FLog::Network] serverId: 10.0.0.9|53640",
    "2024-05-01T10:00:00.005Z,0.1,1,6 [FLog::Graphics] unrelated",
];

/// Stat that reports every file as created `age` ago.
struct Aged(Duration);

#[async_trait]
impl FileStat for Aged {
    async fn created_at(&self, _path: &Path) -> std::io::Result<SystemTime> {
        Ok(SystemTime::now() - self.0)
    }
}

fn fast_locator() -> LocatorConfig {
    LocatorConfig {
        freshness_window_seconds: 15,
        max_attempts: 3,
        delay_seconds: 0,
    }
}

#[tokio::test]
async fn test_session_log_classification() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("player.log");
    std::fs::write(&path, SESSION_LOG.join("\n")).unwrap();

    let content = assert_ok!(normalize(&path).await);
    let lines: Vec<&str> = content.lines().collect();
    let events = LineClassifier::with_builtin_rules().classify(&lines);
    let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();

    assert_eq!(
        names,
        vec![
            "GameJoining",
            "GameStartJoining",
            "GameJoiningUDMUX",
            "GameJoined",
            "GameJoiningEntry",
            "GameJoiningUDMUX",
            "GameJoinedEntry",
        ]
    );
    assert_eq!(
        events.last(),
        Some(&GameEventInfo::new("GameJoinedEntry", "serverId: 10.0.0.9|53640"))
    );
}

#[tokio::test]
async fn test_normalize_drops_invalid_bytes() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("player.log");
    let mut raw = b"[FLog::Output] [BloxstrapRPC] ".to_vec();
    raw.extend_from_slice(&[0xff, 0xfe]);
    raw.extend_from_slice(b"hello\n");
    std::fs::write(&path, raw).unwrap();

    let content = assert_ok!(normalize(&path).await);
    assert_eq!(content, "[FLog::Output] [BloxstrapRPC] hello\n");
}

#[tokio::test]
async fn test_reader_follows_appends() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("player.log");
    std::fs::write(&path, "first\nsecond\n").unwrap();

    let mut reader = IncrementalReader::new(path.clone());
    let initial = assert_ok!(reader.seed().await);
    assert!(initial.iter().any(|l| l == "first"));
    assert!(initial.iter().any(|l| l == "second"));

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "third").unwrap();

    let new_lines = assert_ok!(reader.read_new_lines().await);
    assert_eq!(new_lines, vec!["third".to_string()]);

    let again = assert_ok!(reader.read_new_lines().await);
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_reader_reports_deleted_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("player.log");
    std::fs::write(&path, "first\n").unwrap();

    let mut reader = IncrementalReader::new(path.clone());
    assert_ok!(reader.seed().await);
    std::fs::remove_file(&path).unwrap();

    let err = assert_err!(reader.read_new_lines().await);
    assert!(matches!(err, WatcherError::FileDeleted(p) if p == path));
    assert_eq!(reader.snapshot(), "first\n");
}

#[tokio::test]
async fn test_locator_finds_fresh_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("old.log"), "old").unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let newest = dir.path().join("new.log");
    std::fs::write(&newest, "new").unwrap();

    let locator = LogFileLocator::with_stat(fast_locator(), Aged(Duration::from_secs(1)));
    let found = assert_ok!(locator.locate(dir.path(), &CancellationToken::new()).await);
    assert_eq!(found, newest);
}

#[tokio::test]
async fn test_locator_rejects_stale_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("stale.log"), "stale").unwrap();

    let locator = LogFileLocator::with_stat(fast_locator(), Aged(Duration::from_secs(20)));
    let err = assert_err!(locator.locate(dir.path(), &CancellationToken::new()).await);
    assert!(matches!(
        err,
        LocateError::NoFreshLogFound {
            attempts: 3,
            window_secs: 15,
            ..
        }
    ));
}

#[tokio::test]
async fn test_locator_cancelled() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let locator = LogFileLocator::new(fast_locator());
    let err = assert_err!(locator.locate(dir.path(), &cancel).await);
    assert!(matches!(err, LocateError::Cancelled));
}

#[test]
fn test_config_file_drives_locator() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [locator]
            freshness_window_seconds = 30
            max_attempts = 4

            [settings]
            "roblox.launching.delegate" = true
        "#,
    )
    .unwrap();

    let config = assert_ok!(ConfigLoader::with_path(path).load());
    assert_eq!(config.locator.freshness_window(), Duration::from_secs(30));
    assert_eq!(config.locator.max_attempts, 4);
    assert_eq!(config.locator.delay_seconds, 1);
    assert_eq!(
        config.settings.get("roblox.launching.delegate"),
        Some(&serde_json::Value::Bool(true))
    );
}
