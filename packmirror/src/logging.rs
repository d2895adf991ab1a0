//! Logging setup.
//!
//! Console output goes to stderr so it does not interleave with the status
//! lines and progress bars on stdout. When a log directory is given, a daily
//! rolling file receives the same events without ANSI colors.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{MirrorError, MirrorResult};

/// File name prefix of the rolling log.
pub const LOG_FILE_PREFIX: &str = "packmirror.log";

/// Keeps the non-blocking file writer alive. Drop it last.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "packmirror=debug,packmirror_cli=debug"
    } else {
        "packmirror=info,packmirror_cli=info"
    }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> MirrorResult<LoggingGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| MirrorError::CreateDirFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MirrorError::Config(format!("failed to initialize logging: {}", e)))?;

    Ok(LoggingGuard { _file: guard })
}
