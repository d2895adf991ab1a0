//! `packmirror config`: view and modify settings.

use std::path::Path;

use clap::Subcommand;
use packmirror::config::{ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Key in format section.key (e.g., origin.url)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Key in format section.key (e.g., sync.max_connections)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key, path),
        ConfigCommands::Set { key, value } => run_set(&key, &value, path),
        ConfigCommands::List => run_list(path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'packmirror config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str, path: &Path) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = ConfigFile::load_from(path)?;
    let value = key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str, path: &Path) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load_from(path)?;
    key.set(&mut config, value)?;
    config.save_to(path)?;

    println!("Set {} = {}", key, value);
    Ok(())
}

fn run_list(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;
    let mut current_section = "";

    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (not set)", key.key_name());
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }
    Ok(())
}
