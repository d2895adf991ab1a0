//! `packmirror create`: run a sync.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use packmirror::config::{ConfigFile, MirrorConfig};
use packmirror::{Orchestrator, ReqwestClient};

use crate::error::CliError;
use crate::output::{print_summary, BarProgress, ConsoleObserver};

/// Arguments for `create`. Flags override the configuration file.
#[derive(Debug, Default, Args)]
pub struct CreateArgs {
    /// Origin repository URL
    #[arg(long)]
    pub origin: Option<String>,

    /// Secondary mirror URL (repeatable)
    #[arg(long = "mirror", value_name = "URL")]
    pub mirrors: Vec<String>,

    /// Output directory of the local mirror
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Maximum concurrent requests
    #[arg(long)]
    pub connections: Option<usize>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip removing unreferenced files after publishing
    #[arg(long)]
    pub no_clean: bool,

    /// Skip SHA-256 verification of downloaded files
    #[arg(long)]
    pub no_verify: bool,
}

/// Merge flags over the configuration file.
pub fn resolve_config(
    args: &CreateArgs,
    file: &ConfigFile,
    verbose: bool,
) -> Result<MirrorConfig, CliError> {
    let mut file = file.clone();

    if let Some(origin) = &args.origin {
        file.origin_url = Some(origin.clone());
    }
    if !args.mirrors.is_empty() {
        file.mirrors = args.mirrors.clone();
    }
    if let Some(output) = &args.output {
        file.output_dir = Some(output.clone());
    }

    let mut config = file.to_mirror_config().map_err(|_| {
        CliError::Config(
            "No origin URL specified. Use --origin or set url in config.ini [origin] section."
                .to_string(),
        )
    })?;

    if let Some(connections) = args.connections {
        if connections == 0 {
            return Err(CliError::Config("--connections must be at least 1".to_string()));
        }
        config.max_connections = connections;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    if args.no_clean {
        config.clean = false;
    }
    if args.no_verify {
        config.verify_checksums = false;
    }

    Ok(config.with_verbose(verbose))
}

pub async fn run(args: CreateArgs, file: &ConfigFile, verbose: bool) -> Result<(), CliError> {
    let config = resolve_config(&args, file, verbose)?;
    tracing::info!(
        origin = %config.origin_url,
        mirrors = config.mirrors.len(),
        output = %config.output_dir.display(),
        "Starting sync"
    );

    let client = ReqwestClient::with_settings(config.timeout, &config.user_agent)?;
    let orchestrator = Orchestrator::new(&client, config);

    let mut progress = BarProgress::new();
    let mut observer = ConsoleObserver::new(verbose);
    let summary = orchestrator.run(&mut progress, &mut observer).await?;

    print_summary(&summary, verbose);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> ConfigFile {
        ConfigFile {
            origin_url: Some("https://repo.example.org".to_string()),
            mirrors: vec!["https://m1.example.org".to_string()],
            output_dir: Some(PathBuf::from("/srv/mirror")),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_values_used_without_flags() {
        let config = resolve_config(&CreateArgs::default(), &file(), false).unwrap();
        assert_eq!(config.origin_url, "https://repo.example.org");
        assert_eq!(config.mirrors, vec!["https://m1.example.org"]);
        assert!(config.clean);
    }

    #[test]
    fn test_flags_override_file() {
        let args = CreateArgs {
            origin: Some("https://other.example.org".to_string()),
            mirrors: vec!["https://m2.example.org".to_string()],
            connections: Some(5),
            no_clean: true,
            ..Default::default()
        };
        let config = resolve_config(&args, &file(), true).unwrap();
        assert_eq!(config.origin_url, "https://other.example.org");
        assert_eq!(config.mirrors, vec!["https://m2.example.org"]);
        assert_eq!(config.max_connections, 5);
        assert!(!config.clean);
        assert!(config.verbose);
    }

    #[test]
    fn test_missing_origin_is_config_error() {
        let err = resolve_config(&CreateArgs::default(), &ConfigFile::default(), false).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let args = CreateArgs {
            connections: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(&args, &file(), false).is_err());
    }
}
