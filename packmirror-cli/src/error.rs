//! CLI error type.

use std::fmt;

use packmirror::MirrorError;

/// Errors surfaced to the user. Every variant exits with status 1.
#[derive(Debug)]
pub enum CliError {
    /// Missing or invalid configuration.
    Config(String),
    /// A sync, clean or config operation failed.
    Mirror(MirrorError),
    /// The async runtime could not be started.
    Runtime(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Mirror(MirrorError::InvalidOrigin { url, reason }) => {
                write!(f, "Invalid origin URL '{}': {}", url, reason)
            }
            CliError::Mirror(e) => write!(f, "{}", e),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Mirror(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MirrorError> for CliError {
    fn from(error: MirrorError) -> Self {
        match error {
            MirrorError::Config(msg) => CliError::Config(msg),
            other => CliError::Mirror(other),
        }
    }
}
