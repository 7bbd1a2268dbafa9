//! Daemon paths and the persisted settings store

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default hold threshold in milliseconds
pub const DEFAULT_THRESHOLD_MS: u64 = 3000;

/// Filesystem locations used by the daemon
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the persisted settings file
    pub settings_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("keyheld");

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            settings_path: data_dir.join("settings.json"),
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Persisted user settings; currently a single value, the hold threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Minimum continuous hold duration that qualifies, in milliseconds
    pub threshold_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_THRESHOLD_MS,
        }
    }
}

/// Errors raised by settings validation
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("hold threshold must be a positive number of milliseconds")]
    InvalidThreshold,
}

impl Settings {
    /// Load settings from `path`, falling back to defaults on a missing or
    /// unreadable file. A persisted zero threshold is replaced by the
    /// default rather than ever arming a zero-delay timer.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(settings) if settings.threshold_ms > 0 => settings,
            Ok(_) => {
                warn!("persisted hold threshold is zero, using default");
                Self::default()
            }
            Err(e) => {
                warn!(?e, "settings file unreadable, using defaults");
                Self::default()
            }
        }
    }

    /// Validate and adopt a new threshold; zero is rejected and the
    /// previous value kept
    pub fn set_threshold(&mut self, threshold_ms: u64) -> Result<(), SettingsError> {
        if threshold_ms == 0 {
            return Err(SettingsError::InvalidThreshold);
        }
        self.threshold_ms = threshold_ms;
        Ok(())
    }

    /// Write settings to `path` as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create settings directory")?;
        }
        let raw = serde_json::to_vec_pretty(self)?;
        fs::write(path, raw).context("failed to write settings file")?;
        Ok(())
    }
}

/// Accessor that keeps the settings file in sync with the in-memory value.
///
/// Persistence is best-effort: a failed write is logged and the in-memory
/// value still takes effect for the running daemon.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Open the store at `path`, loading persisted settings if present
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            settings: Settings::load_or_default(path),
        }
    }

    /// Current hold threshold in milliseconds
    pub fn threshold_ms(&self) -> u64 {
        self.settings.threshold_ms
    }

    /// Validate, adopt, and persist a new threshold
    pub fn set_threshold(&mut self, threshold_ms: u64) -> Result<(), SettingsError> {
        self.settings.set_threshold(threshold_ms)?;
        if let Err(e) = self.settings.save(&self.path) {
            warn!(?e, "failed to persist settings");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("keyheld-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("keyheld"));
        assert!(config.settings_path.ends_with("settings.json"));
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(Settings::default().threshold_ms, 3000);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut settings = Settings::default();
        assert!(settings.set_threshold(0).is_err());
        assert_eq!(settings.threshold_ms, DEFAULT_THRESHOLD_MS);
    }

    #[test]
    fn test_set_threshold() {
        let mut settings = Settings::default();
        settings.set_threshold(1500).unwrap();
        assert_eq!(settings.threshold_ms, 1500);
    }

    #[test]
    fn test_load_missing_file_uses_default() {
        let settings = Settings::load_or_default(&temp_path("missing"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = temp_path("round-trip");
        let mut settings = Settings::default();
        settings.set_threshold(4500).unwrap();
        settings.save(&path).unwrap();

        let loaded = Settings::load_or_default(&path);
        assert_eq!(loaded.threshold_ms, 4500);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_zero_threshold_uses_default() {
        let path = temp_path("zero");
        fs::write(&path, r#"{"threshold_ms":0}"#).unwrap();

        let loaded = Settings::load_or_default(&path);
        assert_eq!(loaded.threshold_ms, DEFAULT_THRESHOLD_MS);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_store_set_threshold_persists() {
        let path = temp_path("store");
        let mut store = SettingsStore::open(&path);
        assert_eq!(store.threshold_ms(), DEFAULT_THRESHOLD_MS);

        store.set_threshold(2000).unwrap();
        assert_eq!(store.threshold_ms(), 2000);
        assert_eq!(Settings::load_or_default(&path).threshold_ms, 2000);

        let _ = fs::remove_file(&path);
    }
}
