//! Named configuration keys.
//!
//! Every setting is addressable as `section.key`, which is how the CLI
//! `config get/set/list` commands refer to them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::coord::parse_degrees;
use crate::config::{ConfigError, ConfigFile};

/// Configuration keys in `section.key` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ProviderScriptUrl,
    ProviderApiKey,
    MapLatitude,
    MapLongitude,
    MapZoom,
    MapDisableDefaultUi,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// All keys, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::ProviderScriptUrl,
            ConfigKey::ProviderApiKey,
            ConfigKey::MapLatitude,
            ConfigKey::MapLongitude,
            ConfigKey::MapZoom,
            ConfigKey::MapDisableDefaultUi,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingFile,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::ProviderScriptUrl => "provider.script_url",
            ConfigKey::ProviderApiKey => "provider.api_key",
            ConfigKey::MapLatitude => "map.latitude",
            ConfigKey::MapLongitude => "map.longitude",
            ConfigKey::MapZoom => "map.zoom",
            ConfigKey::MapDisableDefaultUi => "map.disable_default_ui",
            ConfigKey::LoggingLevel => "logging.level",
            ConfigKey::LoggingFile => "logging.file",
        }
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        self.split().0
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        let name = self.name();
        name.split_once('.').unwrap_or((name, ""))
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::ProviderScriptUrl => config.provider.script_url.clone().unwrap_or_default(),
            ConfigKey::ProviderApiKey => config.provider.api_key.clone().unwrap_or_default(),
            ConfigKey::MapLatitude => config.map.latitude.to_string(),
            ConfigKey::MapLongitude => config.map.longitude.to_string(),
            ConfigKey::MapZoom => config.map.zoom.to_string(),
            ConfigKey::MapDisableDefaultUi => config.map.disable_default_ui.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parses and stores `value`. An empty value clears optional settings.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::ProviderScriptUrl => config.provider.script_url = optional(value),
            ConfigKey::ProviderApiKey => config.provider.api_key = optional(value),
            ConfigKey::MapLatitude => {
                config.map.latitude = self.degrees(value, -90.0..=90.0)?;
            }
            ConfigKey::MapLongitude => {
                config.map.longitude = self.degrees(value, -180.0..=180.0)?;
            }
            ConfigKey::MapZoom => {
                config.map.zoom = value
                    .parse()
                    .map_err(|_| self.invalid(value, "expected an integer"))?;
            }
            ConfigKey::MapDisableDefaultUi => {
                config.map.disable_default_ui = parse_bool(value)
                    .ok_or_else(|| self.invalid(value, "expected true or false"))?;
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !matches!(
                    level.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error"
                ) {
                    return Err(self.invalid(value, "expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => config.logging.file = optional(value).map(PathBuf::from),
        }
        Ok(())
    }

    fn degrees(
        &self,
        value: &str,
        range: std::ops::RangeInclusive<f64>,
    ) -> Result<f64, ConfigError> {
        let degrees = parse_degrees(value).map_err(|e| self.invalid(value, &e.to_string()))?;
        if !range.contains(&degrees) {
            return Err(self.invalid(value, "out of range"));
        }
        Ok(degrees)
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
