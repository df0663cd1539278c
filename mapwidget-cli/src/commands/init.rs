//! `init` command: write the configuration file.

use mapwidget::config::{config_file_path, ConfigFile};

use crate::error::CliError;

pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    if path.exists() {
        // Re-saving fills in keys added since the file was written
        let config = ConfigFile::load_from(&path)?;
        config.save_to(&path)?;
        println!("Configuration file already exists: {}", path.display());
    } else {
        ConfigFile::default().save_to(&path)?;
        println!("Created configuration file: {}", path.display());
    }

    println!();
    println!("Set your API key with:");
    println!("  mapwidget config set provider.api_key <KEY>");
    println!("or export MAPWIDGET_API_KEY.");
    Ok(())
}
