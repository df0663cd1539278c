//! Configuration file handling.
//!
//! Settings live in an INI file at `~/.config/mapwidget/config.ini`
//! (platform config directory as reported by `dirs`). A missing file is not
//! an error: every setting has a default.
//!
//! # Example
//!
//! ```ini
//! [provider]
//! script_url = https://maps.googleapis.com/maps/api/js
//! api_key = AIza...
//!
//! [map]
//! latitude = 37.77493
//! longitude = -122.41942
//! zoom = 10
//! disable_default_ui = false
//!
//! [logging]
//! level = info
//! file = /tmp/mapwidget.log
//! ```
//!
//! `MAPWIDGET_SCRIPT_URL` and `MAPWIDGET_API_KEY` override the provider
//! section when set.

mod keys;

pub use keys::ConfigKey;

use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::provider::{DEFAULT_CENTER, DEFAULT_SCRIPT_URL, DEFAULT_ZOOM};

/// Environment variable overriding `provider.script_url`.
pub const ENV_SCRIPT_URL: &str = "MAPWIDGET_SCRIPT_URL";

/// Environment variable overriding `provider.api_key`.
pub const ENV_API_KEY: &str = "MAPWIDGET_API_KEY";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[provider]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub script_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            script_url: Some(DEFAULT_SCRIPT_URL.to_string()),
            api_key: None,
        }
    }
}

/// `[map]` section: initial map options.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: i32,
    pub disable_default_ui: bool,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_CENTER.latitude(),
            longitude: DEFAULT_CENTER.longitude(),
            zoom: DEFAULT_ZOOM,
            disable_default_ui: false,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub provider: ProviderSettings,
    pub map: MapSettings,
    pub logging: LoggingSettings,
}

/// Path of the user configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mapwidget")
        .join("config.ini")
}

impl ConfigFile {
    /// Loads the user configuration file, falling back to defaults when it
    /// does not exist. Environment overrides are applied.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from `path`. Missing keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            other => ConfigError::Parse {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Writes the configuration to the user configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes the configuration to `path`, creating parent directories.
    ///
    /// Unset optional values are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Applies `MAPWIDGET_SCRIPT_URL` / `MAPWIDGET_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable lookup. Empty values
    /// are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_SCRIPT_URL) {
            self.provider.script_url = Some(url);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.provider.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert_eq!(
            config.provider.script_url.as_deref(),
            Some(DEFAULT_SCRIPT_URL)
        );
        assert_eq!(config.provider.api_key, None);
        assert_eq!(config.map.zoom, DEFAULT_ZOOM);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[provider]\napi_key = abc\n\n[map]\nzoom = 4").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("abc"));
        assert_eq!(config.map.zoom, 4);
        assert_eq!(config.map.latitude, DEFAULT_CENTER.latitude());
        assert_eq!(
            config.provider.script_url.as_deref(),
            Some(DEFAULT_SCRIPT_URL)
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.provider.api_key = Some("key-123".to_string());
        config.map.disable_default_ui = true;
        config.logging.file = Some(PathBuf::from("/tmp/mw.log"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "[map]\nlatitude = north\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unreadable_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigFile::load_from(&dir.path().join("missing.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = ConfigFile::default();
        config.apply_overrides_from(|name| match name {
            ENV_SCRIPT_URL => Some("https://example.test/js".to_string()),
            ENV_API_KEY => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(
            config.provider.script_url.as_deref(),
            Some("https://example.test/js")
        );
        assert_eq!(config.provider.api_key, None);
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = config_file_path();
        assert!(path.ends_with("mapwidget/config.ini"));
    }
}
