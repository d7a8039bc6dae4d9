//! Configuration file handling for hscam.
//!
//! Loads configuration from `<config dir>/hscam/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Extra time past the requested duration the device gets to deliver
    /// frames before a stalled stream counts as a timeout
    #[serde(default = "default_turnaround_ms")]
    pub turnaround_ms: u64,
    #[serde(default = "default_live_capture_timeout_ms")]
    pub live_capture_timeout_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            turnaround_ms: default_turnaround_ms(),
            live_capture_timeout_ms: default_live_capture_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Upper bound on frames kept per session, below what device memory allows
    #[serde(default)]
    pub max_frames: Option<usize>,
}

fn default_turnaround_ms() -> u64 {
    500
}

fn default_live_capture_timeout_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn recording_turnaround(&self) -> Duration {
        Duration::from_millis(self.recording.turnaround_ms)
    }

    pub fn live_capture_timeout(&self) -> Duration {
        Duration::from_millis(self.recording.live_capture_timeout_ms)
    }

    /// Apply the `max_frames` cap to a device-derived capacity.
    pub fn clamp_capacity(&self, device_frames: usize) -> usize {
        match self.store.max_frames {
            Some(max) => device_frames.min(max.max(1)),
            None => device_frames,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("hscam").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/hscam/config.toml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.recording_turnaround(), Duration::from_millis(500));
        assert_eq!(config.live_capture_timeout(), Duration::from_millis(1000));
        assert_eq!(config.store.max_frames, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[recording]\nturnaround_ms = 50\n\n[store]\nmax_frames = 8").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.recording.turnaround_ms, 50);
        assert_eq!(config.recording.live_capture_timeout_ms, 1000);
        assert_eq!(config.store.max_frames, Some(8));
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[recording\nturnaround_ms = ").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(format!("{}", err).contains("Failed to parse config file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_clamp_capacity() {
        let mut config = Config::default();
        assert_eq!(config.clamp_capacity(64), 64);
        config.store.max_frames = Some(10);
        assert_eq!(config.clamp_capacity(64), 10);
        assert_eq!(config.clamp_capacity(4), 4);
        config.store.max_frames = Some(0);
        assert_eq!(config.clamp_capacity(4), 1);
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        assert!(default_path().ends_with("hscam/config.toml"));
    }
}
