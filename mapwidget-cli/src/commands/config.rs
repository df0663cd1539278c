//! `config` subcommands: get, set, list and path.

use clap::Subcommand;
use mapwidget::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Key as section.key (e.g., map.zoom)
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Key as section.key (e.g., provider.api_key)
        key: String,

        /// New value; empty clears optional settings
        value: String,
    },

    /// Print every setting grouped by section
    List,

    /// Print the configuration file location
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            println!("{}", display_value(&key.get(&load_file()?)));
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = load_file()?;
            key.set(&mut config, &value)
                .map_err(|e| CliError::Config(e.to_string()))?;
            config.save()?;
            println!("Set {} = {}", key, display_value(&key.get(&config)));
            Ok(())
        }
        ConfigCommands::List => {
            print!("{}", render_list(&load_file()?));
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

/// Loads the file as written, without environment overrides, so `set`
/// never persists an override.
fn load_file() -> Result<ConfigFile, CliError> {
    let path = config_file_path();
    if path.exists() {
        Ok(ConfigFile::load_from(&path)?)
    } else {
        Ok(ConfigFile::default())
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'mapwidget config list' to see available keys.",
            key
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn render_list(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            if !section.is_empty() {
                out.push('\n');
            }
            section = key.section();
            out.push_str(&format!("[{}]\n", section));
        }
        out.push_str(&format!(
            "  {} = {}\n",
            key.key_name(),
            display_value(&key.get(config))
        ));
    }
    out
}
