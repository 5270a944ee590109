//! Matcher configuration persisted as TOML under the app directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::atomic_io::replace_file_atomic;

/// Config file name inside the `.segue` root.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Cache file name inside the app cache directory.
pub const CACHE_FILE_NAME: &str = "start_features.json";
/// Window length used when no configuration exists yet.
pub const DEFAULT_MAX_CROSSFADE_SECONDS: f32 = 10.0;

/// Errors that may occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    /// `max_crossfade_seconds` must be positive and finite.
    #[error("max_crossfade_seconds must be a positive number, got {0}")]
    InvalidMaxCrossfade(f32),
}

/// Settings for building and querying one feature cache.
///
/// `max_crossfade_seconds` is fixed for the lifetime of a cache file;
/// opening an existing cache under a different value is rejected, so
/// changing this setting means pointing `cache_file` somewhere new (or
/// deleting the old store deliberately).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub max_crossfade_seconds: f32,
    pub cache_file: PathBuf,
}

impl MatcherConfig {
    /// Default configuration rooted in the user's app directories.
    pub fn default_paths() -> Result<Self, ConfigError> {
        Ok(Self {
            max_crossfade_seconds: DEFAULT_MAX_CROSSFADE_SECONDS,
            cache_file: app_dirs::cache_dir()?.join(CACHE_FILE_NAME),
        })
    }

    /// Load the config from the app directory, falling back to defaults
    /// when no file exists yet. Parse failures are surfaced, not defaulted.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load_from_path(&path)
        } else {
            Self::default_paths()
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config atomically, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let text = toml::to_string_pretty(self)?;
        replace_file_atomic(path, text.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_crossfade_seconds.is_finite() || self.max_crossfade_seconds <= 0.0 {
            return Err(ConfigError::InvalidMaxCrossfade(self.max_crossfade_seconds));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn toml_round_trip_preserves_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = MatcherConfig {
            max_crossfade_seconds: 7.5,
            cache_file: dir.path().join("features.json"),
        };
        config.save_to_path(&path).unwrap();
        let loaded = MatcherConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_max_crossfade_is_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "max_crossfade_seconds = -2.0\ncache_file = \"cache.json\"\n",
        )
        .unwrap();
        assert!(matches!(
            MatcherConfig::load_from_path(&path),
            Err(ConfigError::InvalidMaxCrossfade(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_crossfade_seconds = [").unwrap();
        assert!(matches!(
            MatcherConfig::load_from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn save_rejects_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let config = MatcherConfig {
            max_crossfade_seconds: 0.0,
            cache_file: dir.path().join("features.json"),
        };
        assert!(matches!(
            config.save_to_path(&dir.path().join("config.toml")),
            Err(ConfigError::InvalidMaxCrossfade(_))
        ));
    }
}
