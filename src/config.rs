use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "tabdeck";
const SETTINGS_FILE: &str = "settings.json";

/// Which persistence backend to use for saved colors and icons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// File backend when the storage directory is usable, key-value store otherwise.
    #[default]
    Auto,
    File,
    KeyValue,
}

impl BackendPreference {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "file" => Some(Self::File),
            "key_value" => Some(Self::KeyValue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the JSON record files. Defaults to the platform data dir.
    pub storage_dir: Option<PathBuf>,
    pub backend: BackendPreference,
    /// SQLite file backing the fallback key-value store.
    pub key_value_path: Option<PathBuf>,
    /// Interval of the periodic color sweep.
    pub sweep_interval_secs: u64,
    /// Delay before the safety-net reconciliation pass after startup.
    pub reconcile_delay_ms: u64,
    /// Delay before saved colors and icons are restored at startup.
    pub restore_delay_ms: u64,
    /// Delay before a freshly created group samples its favicon color.
    pub new_group_color_delay_ms: u64,
    /// Delay between unpinning a folder's tabs and regrouping them.
    pub folder_convert_delay_ms: u64,
    pub default_folder_label: String,
    pub default_group_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: None,
            backend: BackendPreference::Auto,
            key_value_path: None,
            sweep_interval_secs: 30,
            reconcile_delay_ms: 1000,
            restore_delay_ms: 500,
            new_group_color_delay_ms: 300,
            folder_convert_delay_ms: 200,
            default_folder_label: "New Folder".to_string(),
            default_group_label: "New Group".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the user's config directory, then apply environment overrides.
    /// Returns defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let settings = match Self::try_load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load settings, using defaults: {:#}", e);
                Self::default()
            }
        };
        settings.with_env_overrides()
    }

    fn try_load() -> Result<Self> {
        let path = settings_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = serde_json::from_str(&content).context("Failed to parse settings file")?;
        Ok(settings)
    }

    /// Apply `TABDECK_STORAGE_DIR`, `TABDECK_BACKEND` and `TABDECK_SWEEP_SECS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("TABDECK_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(backend) = std::env::var("TABDECK_BACKEND")
            .ok()
            .and_then(|s| BackendPreference::from_str(s.trim()))
        {
            self.backend = backend;
        }
        if let Some(secs) = std::env::var("TABDECK_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            self.sweep_interval_secs = secs;
        }
        self
    }

    /// Storage directory for record files, if one can be determined.
    pub fn resolved_storage_dir(&self) -> Option<PathBuf> {
        self.storage_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
    }

    /// Location of the SQLite file for the fallback store, if one can be determined.
    pub fn resolved_key_value_path(&self) -> Option<PathBuf> {
        self.key_value_path
            .clone()
            .or_else(|| self.resolved_storage_dir().map(|dir| dir.join("tabdeck.db")))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn new_group_color_delay(&self) -> Duration {
        Duration::from_millis(self.new_group_color_delay_ms)
    }

    pub fn folder_convert_delay(&self) -> Duration {
        Duration::from_millis(self.folder_convert_delay_ms)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

fn settings_path() -> Result<PathBuf> {
    let dirs = project_dirs().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dirs.config_dir().join(SETTINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "backend": "key_value", "sweep_interval_secs": 5 }"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.backend, BackendPreference::KeyValue);
        assert_eq!(settings.sweep_interval_secs, 5);
        assert_eq!(settings.reconcile_delay_ms, 1000);
        assert_eq!(settings.default_folder_label, "New Folder");
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn key_value_path_defaults_next_to_records() {
        let settings = Settings {
            storage_dir: Some(PathBuf::from("/tmp/tabdeck-test")),
            ..Settings::default()
        };
        assert_eq!(
            settings.resolved_key_value_path(),
            Some(PathBuf::from("/tmp/tabdeck-test/tabdeck.db"))
        );
    }
}
