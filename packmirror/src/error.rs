//! Error types for the mirror engine.
//!
//! Only configuration and index-shape problems surface as [`MirrorError`].
//! Individual fetch failures are data (see [`crate::fetch::FetchFailure`]) and
//! never abort a batch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can stop a sync run or one of its phases.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The configured origin URI failed syntactic validation.
    #[error("invalid origin url '{url}': {reason}")]
    InvalidOrigin { url: String, reason: String },

    /// A root index or shard document does not have the expected shape.
    #[error("malformed index {source_uri}: {reason}")]
    MalformedIndex { source_uri: String, reason: String },

    /// The root document could not be fetched from the origin.
    #[error("failed to fetch root index from {url}: {reason}")]
    RootFetch { url: String, reason: String },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to move a staged entry into place.
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Failed to delete a file.
    #[error("failed to remove {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// A URI would resolve outside of the output tree.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl MirrorError {
    /// Shorthand for a [`MirrorError::MalformedIndex`].
    pub fn malformed(source_uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIndex {
            source_uri: source_uri.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a precondition failure detected before any
    /// network activity.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidOrigin { .. } | Self::Config(_))
    }
}
