//! Layered settings.
//!
//! Sources, later ones win:
//! 1. compiled-in defaults
//! 2. `spectro.toml` (or the path given with `--config` / `SPECTRO_CONFIG`)
//! 3. environment variables prefixed `SPECTRO_`, `__` between levels,
//!    e.g. `SPECTRO_ACQUISITION__LOG_INTERVAL_MS=500`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::session::INTEGRATION_RANGE_MS;

pub const DEFAULT_CONFIG_FILE: &str = "spectro.toml";
pub const ENV_PREFIX: &str = "SPECTRO_";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default `env_logger` filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub storage: StorageSettings,
    pub acquisition: AcquisitionSettings,
    pub device: DeviceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub spectra_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub log_interval_ms: u64,
    pub preview_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Simulated,
    Replay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_path: Option<PathBuf>,
    pub default_integration_ms: u32,
    /// Sensor width of the simulated backend.
    pub pixels: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            storage: StorageSettings::default(),
            acquisition: AcquisitionSettings::default(),
            device: DeviceSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            spectra_dir: "spectra".to_string(),
            logs_dir: "logs".to_string(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            log_interval_ms: 1000,
            preview_interval_ms: 100,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            replay_path: None,
            default_integration_ms: 50,
            pixels: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown log_level '{0}', expected one of off, error, warn, info, debug, trace")]
    LogLevel(String),

    #[error("acquisition.{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("device.default_integration_ms must be between 1 and 1000, got {0}")]
    Integration(u32),

    #[error("device.pixels must be at least 1")]
    NoPixels,

    #[error("device.backend = \"replay\" needs device.replay_path")]
    MissingReplayPath,
}

impl Settings {
    /// The provider stack without extraction, for callers that add layers.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let settings: Settings = Self::figment(path)
            .extract()
            .with_context(|| format!("loading settings from {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::LogLevel(self.log_level.clone()));
        }
        if self.acquisition.log_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("log_interval_ms"));
        }
        if self.acquisition.preview_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("preview_interval_ms"));
        }
        if !INTEGRATION_RANGE_MS.contains(&self.device.default_integration_ms) {
            return Err(ConfigError::Integration(self.device.default_integration_ms));
        }
        if self.device.pixels == 0 {
            return Err(ConfigError::NoPixels);
        }
        if self.device.backend == Backend::Replay && self.device.replay_path.is_none() {
            return Err(ConfigError::MissingReplayPath);
        }
        Ok(())
    }

    pub fn spectra_dir(&self) -> PathBuf {
        self.storage.root.join(&self.storage.spectra_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.storage.root.join(&self.storage.logs_dir)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.log_interval_ms)
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.preview_interval_ms)
    }
}

/// Resolve the settings file: `--config <path>` first, then
/// `SPECTRO_CONFIG`, then [`DEFAULT_CONFIG_FILE`].
pub fn config_path(args: &[String]) -> PathBuf {
    if let Some(i) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(i + 1) {
            return PathBuf::from(path);
        }
    }
    std::env::var_os("SPECTRO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn from_toml(text: &str) -> Settings {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(text))
            .extract()
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.log_interval(), Duration::from_millis(1000));
        assert_eq!(s.preview_interval(), Duration::from_millis(100));
        assert_eq!(s.spectra_dir(), PathBuf::from("./spectra"));
    }

    #[test]
    fn toml_overrides_only_what_it_names() {
        let s = from_toml(
            r#"
            [acquisition]
            log_interval_ms = 250

            [device]
            backend = "replay"
            replay_path = "lamp.parquet"
            "#,
        );
        assert_eq!(s.acquisition.log_interval_ms, 250);
        assert_eq!(s.acquisition.preview_interval_ms, 100);
        assert_eq!(s.device.backend, Backend::Replay);
        assert_eq!(s.device.default_integration_ms, 50);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validation_failures() {
        let s = from_toml("log_level = \"loud\"");
        assert_eq!(s.validate(), Err(ConfigError::LogLevel("loud".into())));

        let s = from_toml("[acquisition]\nlog_interval_ms = 0");
        assert_eq!(s.validate(), Err(ConfigError::ZeroInterval("log_interval_ms")));

        let s = from_toml("[device]\ndefault_integration_ms = 5000");
        assert_eq!(s.validate(), Err(ConfigError::Integration(5000)));

        let s = from_toml("[device]\nbackend = \"replay\"");
        assert_eq!(s.validate(), Err(ConfigError::MissingReplayPath));
    }

    #[test]
    fn load_reads_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(
            Settings::load(&missing).unwrap().storage,
            StorageSettings::default()
        );

        let path = dir.path().join("spectro.toml");
        fs::write(&path, "[storage]\nroot = \"/data\"\nlogs_dir = \"runs\"\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.logs_dir(), PathBuf::from("/data/runs"));
    }

    #[test]
    fn config_flag_wins() {
        let args = vec!["rusty-spectro".to_string(), "--config".to_string(), "x.toml".to_string()];
        assert_eq!(config_path(&args), PathBuf::from("x.toml"));
    }
}
