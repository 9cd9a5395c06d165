//! First-run auto-configuration.
//!
//! Pushes the host settings that keep its own terminal restore from
//! fighting crash replay, then writes a marker so it happens once. Only the
//! listed keys are touched; everything else in the host's settings is left
//! alone.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::config::Settings;
use crate::host::TerminalHost;
use crate::store::KeyValueStore;

pub const CONFIGURED_MARKER_KEY: &str = "paneward.configured";

pub const PERSISTENT_SESSIONS_SETTING: &str = "terminal.integrated.enablePersistentSessions";
pub const DEFAULT_LOCATION_SETTING: &str = "terminal.integrated.defaultLocation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatus {
    /// `autoConfigure` is off.
    Disabled,
    AlreadyConfigured,
    Configured { applied: Vec<String> },
}

/// Settings to push for the given configuration.
pub fn recommended_host_settings(settings: &Settings) -> Vec<(&'static str, serde_json::Value)> {
    let mut recommended = Vec::new();
    if !settings.persistent_sessions {
        recommended.push((PERSISTENT_SESSIONS_SETTING, json!(false)));
    }
    if settings.editor_area {
        recommended.push((DEFAULT_LOCATION_SETTING, json!("editor")));
    }
    recommended
}

pub struct SetupChecker {
    kv: Arc<dyn KeyValueStore>,
}

impl SetupChecker {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.kv.get(CONFIGURED_MARKER_KEY), Ok(Some(_)))
    }

    /// Applies the recommended host settings once. A setting the host
    /// rejects is logged and skipped; the marker is still written so the
    /// user isn't fought on every activation.
    pub fn ensure_configured(&self, host: &dyn TerminalHost, settings: &Settings) -> SetupStatus {
        if !settings.auto_configure {
            return SetupStatus::Disabled;
        }
        if self.is_configured() {
            return SetupStatus::AlreadyConfigured;
        }

        let mut applied = Vec::new();
        for (key, value) in recommended_host_settings(settings) {
            match host.update_setting(key, value) {
                Ok(()) => applied.push(key.to_string()),
                Err(err) => warn!(key, error = %err, "Failed to apply host setting"),
            }
        }

        let stamp = chrono::Utc::now().to_rfc3339();
        if let Err(err) = self.kv.set(CONFIGURED_MARKER_KEY, &stamp) {
            warn!(error = %err, "Failed to write configured marker");
        }
        info!(applied = applied.len(), "Applied first-run host settings");
        SetupStatus::Configured { applied }
    }

    /// Forgets the marker so the next activation configures again.
    pub fn reset(&self) -> crate::error::Result<()> {
        self.kv.remove(CONFIGURED_MARKER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::store::MemoryKeyValueStore;

    fn checker() -> SetupChecker {
        SetupChecker::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn test_first_run_pushes_settings_once() {
        let checker = checker();
        let host = MemoryHost::new();
        let settings = Settings::default();

        let status = checker.ensure_configured(&host, &settings);
        assert_eq!(
            status,
            SetupStatus::Configured {
                applied: vec![
                    PERSISTENT_SESSIONS_SETTING.to_string(),
                    DEFAULT_LOCATION_SETTING.to_string()
                ]
            }
        );
        assert_eq!(host.settings()[PERSISTENT_SESSIONS_SETTING], json!(false));
        assert_eq!(host.settings()[DEFAULT_LOCATION_SETTING], json!("editor"));

        assert_eq!(
            checker.ensure_configured(&host, &settings),
            SetupStatus::AlreadyConfigured
        );
    }

    #[test]
    fn test_respects_user_choices() {
        let settings = Settings {
            persistent_sessions: true,
            editor_area: false,
            ..Settings::default()
        };
        assert!(recommended_host_settings(&settings).is_empty());
    }

    #[test]
    fn test_disabled_does_not_write_marker() {
        let checker = checker();
        let host = MemoryHost::new();
        let settings = Settings {
            auto_configure: false,
            ..Settings::default()
        };
        assert_eq!(checker.ensure_configured(&host, &settings), SetupStatus::Disabled);
        assert!(!checker.is_configured());
        assert!(host.settings().is_empty());
    }

    #[test]
    fn test_reset_allows_reconfiguring() {
        let checker = checker();
        let host = MemoryHost::new();
        checker.ensure_configured(&host, &Settings::default());
        checker.reset().unwrap();
        assert!(!checker.is_configured());
    }
}
