//! Configuration types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the client is launched and recognised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Command used to open the client or a launch URL.
    pub launch_command: String,
    /// Client application opened when no URL is given.
    pub app_path: PathBuf,
    /// Pattern passed to `pgrep -f` to list candidate processes.
    pub process_pattern: String,
    /// Executable basename of the player process.
    pub player_process: String,
    /// Directory holding the client's log files.
    pub logs_dir: Option<PathBuf>,
    /// Wait after launching before looking for the process.
    pub warmup_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            launch_command: "open".to_string(),
            app_path: PathBuf::from("/Applications/Roblox.app"),
            process_pattern: "Roblox".to_string(),
            player_process: "RobloxPlayer".to_string(),
            logs_dir: None,
            warmup_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Resolved log directory, defaulting to `~/Library/Logs/Roblox`.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join("Library")
                .join("Logs")
                .join("Roblox")
        })
    }

    #[must_use]
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Log file search options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocatorConfig {
    /// Maximum age of a log file belonging to the current session.
    pub freshness_window_seconds: u64,
    /// Number of checks before giving up.
    pub max_attempts: u32,
    /// Wait between checks.
    pub delay_seconds: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            freshness_window_seconds: 15,
            max_attempts: 10,
            delay_seconds: 1,
        }
    }
}

impl LocatorConfig {
    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_seconds)
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

/// Session loop timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    /// Liveness check interval for the client process.
    pub poll_interval_ms: u64,
    /// Wait before respawning a dead tail process.
    pub tail_restart_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            tail_restart_delay_ms: 250,
        }
    }
}

/// Shortest interval any session loop runs at.
pub const MIN_LOOP_INTERVAL: Duration = Duration::from_millis(1);

impl PollConfig {
    /// Liveness check interval, never shorter than [`MIN_LOOP_INTERVAL`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_LOOP_INTERVAL)
    }

    /// Tail restart delay, never shorter than [`MIN_LOOP_INTERVAL`].
    #[must_use]
    pub fn tail_restart_delay(&self) -> Duration {
        Duration::from_millis(self.tail_restart_delay_ms).max(MIN_LOOP_INTERVAL)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub client: ClientConfig,
    pub locator: LocatorConfig,
    pub monitor: PollConfig,
    /// Read-only settings, e.g. `"roblox.launching.delegate" = true`.
    pub settings: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_defaults() {
        let config = LocatorConfig::default();
        assert_eq!(config.freshness_window(), Duration::from_secs(15));
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_poll_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [monitor]
            poll_interval_ms = 0
            tail_restart_delay_ms = 0
        "#,
        )
        .unwrap();
        assert_eq!(config.monitor.poll_interval(), MIN_LOOP_INTERVAL);
        assert_eq!(config.monitor.tail_restart_delay(), MIN_LOOP_INTERVAL);
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.player_process, "RobloxPlayer");
        assert_eq!(config.warmup(), Duration::from_secs(1));
        assert!(config.logs_dir().ends_with("Library/Logs/Roblox"));
    }

    #[test]
    fn test_explicit_logs_dir_wins() {
        let config = ClientConfig {
            logs_dir: Some(PathBuf::from("/tmp/logs")),
            ..Default::default()
        };
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let toml = r#"
            [locator]
            max_attempts = 3

            [settings]
            "roblox.launching.delegate" = true
        "#;
        let config: MonitorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.locator.max_attempts, 3);
        assert_eq!(config.locator.freshness_window_seconds, 15);
        assert_eq!(config.client, ClientConfig::default());
        assert_eq!(
            config.settings.get("roblox.launching.delegate"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
