//! Colored CLI output for monitor events.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::monitor::MonitorEvent;
use crate::watcher::GameEventInfo;

/// Current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length of event data shown by default.
const DEFAULT_MAX_LEN: usize = 120;

/// Truncate a string to `max_len` bytes, adding an ellipsis if truncated.
///
/// Cuts on a character boundary so multi-byte text never splits.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let mut end = max_len - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// JSON rendering of an event, one object per line.
#[must_use]
pub fn event_json(event: &MonitorEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Print a classified game event.
pub fn print_game_event(info: &GameEventInfo, raw_mode: bool) {
    println!(
        "{} {} {} {}",
        timestamp().dimmed(),
        "[EVENT]".cyan().bold(),
        info.event.bold(),
        truncate(&info.data, DEFAULT_MAX_LEN, raw_mode).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print the client exit notice.
pub fn print_exit() {
    println!(
        "{} {} Roblox exited",
        timestamp().dimmed(),
        "[EXIT]".yellow().bold()
    );
    let _ = io::stdout().flush();
}

/// Print any monitor event, as JSON when `json` is set.
pub fn print_event(event: &MonitorEvent, json: bool, raw_mode: bool) {
    if json {
        println!("{}", event_json(event));
        let _ = io::stdout().flush();
        return;
    }
    match event {
        MonitorEvent::Exit => print_exit(),
        MonitorEvent::GameEvent(info) => print_game_event(info, raw_mode),
    }
}

/// Print the monitored instance once it is up.
pub fn print_started(pid: Option<u32>, log_path: &str) {
    println!(
        "{} {} pid={}, log={}",
        timestamp().dimmed(),
        "[START]".blue().bold(),
        pid.map_or_else(|| "?".to_string(), |p| p.to_string()).cyan(),
        log_path.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a located log file.
pub fn print_log_path(path: &str) {
    println!("{} {}", "[LOG]".green().bold(), path);
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10, false), "hello");
    }

    #[test]
    fn test_truncate_exact_length() {
        assert_eq!(truncate("hello", 5, false), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 8, false), "hello...");
    }

    #[test]
    fn test_truncate_very_short_max() {
        assert_eq!(truncate("hello", 3, false), "...");
        assert_eq!(truncate("hello", 0, false), "...");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "é" is two bytes; a cut at byte 5 would land inside it.
        let s = "abcdé fin";
        let out = truncate(s, 8, false);
        assert_eq!(out, "abcd...");
    }

    #[test]
    fn test_truncate_raw_mode_no_truncation() {
        let long_string = "a".repeat(200);
        assert_eq!(truncate(&long_string, 10, true), long_string);
    }

    #[test]
    fn test_event_json() {
        assert_eq!(event_json(&MonitorEvent::Exit), r#"{"type":"exit"}"#);
        let json = event_json(&MonitorEvent::GameEvent(GameEventInfo::new("A", "b")));
        assert!(json.contains(r#""type":"gameEvent""#));
        assert!(json.contains(r#""event":"A""#));
    }
}
