//! Read-only settings lookup and the launch delegate toggle.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::ShellError;

/// Settings key controlling whether the launch delegate is re-enabled.
pub const DELEGATE_SETTING_KEY: &str = "roblox.launching.delegate";

/// Read-only key/value settings.
pub trait SettingsStore: Send + Sync {
    /// Raw value for `key`, if set.
    fn get_raw(&self, key: &str) -> Option<serde_json::Value>;
}

/// Typed lookup. Returns `None` when the key is missing or has another type.
pub fn get_value<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    let raw = store.get_raw(key)?;
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key, error = %e, "Setting has unexpected type");
            None
        }
    }
}

/// In-memory settings, usually built from the `[settings]` config table.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, serde_json::Value>,
}

impl MemorySettings {
    #[must_use]
    pub fn new(values: HashMap<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }
}

impl SettingsStore for MemorySettings {
    fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }
}

/// Enables or disables the launch delegate integration.
#[async_trait]
pub trait DelegateToggle: Send + Sync {
    async fn toggle(&self, enabled: bool) -> Result<(), ShellError>;
}

/// Delegate toggle that only records the request in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

#[async_trait]
impl DelegateToggle for NoopDelegate {
    async fn toggle(&self, enabled: bool) -> Result<(), ShellError> {
        tracing::debug!(enabled, "Delegate toggle requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_value_typed() {
        let mut settings = MemorySettings::default();
        settings.set(DELEGATE_SETTING_KEY, serde_json::json!(true));

        assert_eq!(get_value::<bool>(&settings, DELEGATE_SETTING_KEY), Some(true));
    }

    #[test]
    fn test_get_value_missing_key() {
        let settings = MemorySettings::default();
        assert_eq!(get_value::<bool>(&settings, "missing"), None);
    }

    #[test]
    fn test_get_value_wrong_type_is_none() {
        let mut settings = MemorySettings::default();
        settings.set(DELEGATE_SETTING_KEY, serde_json::json!("yes"));

        assert_eq!(get_value::<bool>(&settings, DELEGATE_SETTING_KEY), None);
    }

    #[tokio::test]
    async fn test_noop_delegate_succeeds() {
        assert!(NoopDelegate.toggle(true).await.is_ok());
        assert!(NoopDelegate.toggle(false).await.is_ok());
    }
}
