//! `packmirror clean`: remove unreferenced metadata.

use std::path::PathBuf;

use clap::Args;
use console::style;
use packmirror::config::{default_output_dir, ConfigFile};
use packmirror::sync::clean_published;

use crate::error::CliError;
use crate::output::format_bytes;

#[derive(Debug, Default, Args)]
pub struct CleanArgs {
    /// Output directory of the local mirror
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(args: CleanArgs, file: &ConfigFile) -> Result<(), CliError> {
    let output_dir = args
        .output
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(default_output_dir);

    let report = clean_published(&output_dir, &file.shard_template, &file.package_template)?;
    if report.refused {
        println!(
            "{} nothing is referenced by {}, refusing to clean",
            style("warning:").yellow().bold(),
            output_dir.display()
        );
    } else {
        println!(
            "Removed {} files ({}), kept {}",
            report.files_removed,
            format_bytes(report.bytes_freed),
            report.files_kept
        );
    }
    Ok(())
}
