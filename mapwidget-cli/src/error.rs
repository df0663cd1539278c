//! CLI error types.

use std::fmt;

use mapwidget::config::ConfigError;
use mapwidget::geocode::GeocodeError;
use mapwidget::logging::LoggingError;
use mapwidget::provider::HttpError;
use mapwidget::view::ViewError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration key or value.
    Config(String),

    /// Reading or writing the configuration file failed.
    ConfigFile(ConfigError),

    /// Logging could not be set up.
    Logging(LoggingError),

    /// Failed to create the Tokio runtime.
    Runtime(String),

    /// HTTP client setup failed.
    Http(HttpError),

    /// The map could not be created or updated.
    Map(ViewError),

    /// The address did not resolve.
    Geocode(GeocodeError),

    /// Bad command-line input.
    Input(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Runtime(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::Http(e) => write!(f, "HTTP client error: {}", e),
            CliError::Map(e) => write!(f, "Map error: {}", e),
            CliError::Geocode(e) => write!(f, "Geocoding failed: {}", e),
            CliError::Input(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Map(e) => Some(e),
            CliError::Geocode(e) => Some(e),
            CliError::Config(_) | CliError::Runtime(_) | CliError::Input(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<HttpError> for CliError {
    fn from(e: HttpError) -> Self {
        CliError::Http(e)
    }
}

impl From<ViewError> for CliError {
    fn from(e: ViewError) -> Self {
        CliError::Map(e)
    }
}

impl From<GeocodeError> for CliError {
    fn from(e: GeocodeError) -> Self {
        CliError::Geocode(e)
    }
}
