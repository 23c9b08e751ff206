//! Roblox Monitor - launch the Roblox client and follow its log as game events.

pub mod config;
pub mod display;
pub mod monitor;
pub mod shell;
pub mod timer;
pub mod watcher;
