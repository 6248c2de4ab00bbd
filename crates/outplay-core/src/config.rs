use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::OutplayError;
use crate::models::PlayerConfiguration;
use crate::registry::PlayerCapabilityRegistry;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Configured players, highest priority first.
    #[serde(default, rename = "player")]
    pub players: Vec<PlayerConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// HTTP status poll interval.
    pub poll_interval_ms: u64,
    /// Per-request timeout for status polls and control commands.
    pub request_timeout_ms: u64,
    /// Duplicate-suppression window for file-watch telemetry.
    pub quiet_window_ms: u64,
    /// Upper bound on waiting for the player window behind the splash cover.
    pub splash_timeout_ms: u64,
    /// How long a stopped session waits for the player process to exit.
    pub stop_grace_ms: u64,
    /// Where generated playlists are written. Defaults to the OS temp dir.
    #[serde(default)]
    pub playlist_dir: Option<PathBuf>,
}

impl GeneralConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn splash_timeout(&self) -> Duration {
        Duration::from_millis(self.splash_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn playlist_dir(&self) -> PathBuf {
        self.playlist_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        AppConfig::default().general
    }
}

impl AppConfig {
    /// Load config: the user file if it exists, otherwise built-in defaults.
    pub fn load() -> Result<Self, OutplayError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Self::from_toml(DEFAULT_CONFIG)
        }
    }

    /// Load a user config file. Its players replace built-in players of the
    /// same name and the rest are appended; a missing `[general]` table
    /// keeps the built-in settings.
    pub fn load_from(path: &Path) -> Result<Self, OutplayError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OutplayError::Config(e.to_string()))?;
        let user = Self::from_toml(&content)?;
        let mut registry = PlayerCapabilityRegistry::from_config(&Self::default());
        registry.merge_user(&user.players);
        Ok(Self {
            general: user.general,
            players: registry.players,
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, OutplayError> {
        toml::from_str(toml_str).map_err(|e| OutplayError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Directory for log files.
    pub fn log_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "outplay")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
