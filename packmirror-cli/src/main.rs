//! packmirror CLI
//!
//! Keeps a local mirror of a package metadata repository in sync with its
//! origin.

mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use packmirror::config::{config_file_path, ConfigFile};
use packmirror::logging::init_logging;

use commands::clean::CleanArgs;
use commands::config::ConfigCommands;
use commands::create::CreateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "packmirror", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show per-mirror warnings, error tables and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Synchronize the local mirror with the origin
    Create(CreateArgs),

    /// Delete files no longer referenced by the published root index
    Clean(CleanArgs),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.clone().unwrap_or_else(config_file_path);

    let command = match cli.command {
        Commands::Config(command) => return commands::config::run(command, &config_path),
        other => other,
    };

    let file = ConfigFile::load_from(&config_path)?;
    let _guard = init_logging(file.log_dir.as_deref(), cli.verbose)?;
    tracing::debug!(config = %config_path.display(), "Loaded configuration");

    match command {
        Commands::Create(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            runtime.block_on(commands::create::run(args, &file, cli.verbose))
        }
        Commands::Clean(args) => commands::clean::run(args, &file),
        Commands::Config(_) => Ok(()),
    }
}
