//! MapWidget CLI - Command-line interface
//!
//! Drives a map widget from the terminal: manage the configuration file,
//! geocode addresses against the Google Maps Platform, and render a
//! headless map from property values.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mapwidget::config::ConfigFile;
use mapwidget::logging::init_logging;

use commands::config::ConfigCommands;
use commands::show::ShowArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "mapwidget")]
#[command(version, about = "Declarative map widget controller", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the configuration file with default settings
    Init,

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Geocode an address and show where the map lands
    Geocode {
        /// Address to look up
        address: String,

        /// API key (overrides provider.api_key)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Render a headless map from property values and print its state
    Show(ShowArgs),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = ConfigFile::load().unwrap_or_else(|e| {
        eprintln!("Warning: {}; using default settings", e);
        ConfigFile::default()
    });

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let log_file = cli.log_file.clone().or_else(|| config.logging.file.clone());
    let _guard = init_logging(level, log_file.as_deref())?;

    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Geocode { address, api_key } => {
            commands::geocode::run(&config, &address, api_key)
        }
        Commands::Show(args) => commands::show::run(&config, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_show_with_markers() {
        let cli = Cli::try_parse_from([
            "mapwidget", "show", "--zoom", "5", "--marker", "1,2", "--marker", "3,4",
        ])
        .unwrap();
        match cli.command {
            Commands::Show(args) => {
                assert_eq!(args.zoom.as_deref(), Some("5"));
                assert_eq!(args.markers, vec!["1,2", "3,4"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mapwidget", "config", "path", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
