//! Task and outcome types shared by the scheduler and fallback controller.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::MirrorError;
use crate::http::FetchError;

/// One content-addressed download: relative URI plus expected hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub uri: String,
    pub hash: String,
}

impl FetchTask {
    pub fn new(uri: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            hash: hash.into(),
        }
    }
}

/// Category of a per-task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-2xx response.
    Status(u16),
    Timeout,
    Transport,
    /// Body did not hash to the expected value.
    Checksum,
    /// Body could not be persisted.
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Status(code) => write!(f, "HTTP {}", code),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Checksum => write!(f, "checksum mismatch"),
            FailureKind::Write => write!(f, "write error"),
        }
    }
}

/// A recorded per-task failure. Never raised as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    /// Base URI of the mirror the request was routed to.
    pub mirror: String,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, mirror: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            mirror: mirror.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_fetch_error(error: &FetchError, mirror: &str) -> Self {
        let kind = match error {
            FetchError::Status(code) => FailureKind::Status(*code),
            FetchError::Timeout => FailureKind::Timeout,
            FetchError::Transport(_) => FailureKind::Transport,
        };
        Self::new(kind, mirror, error.to_string())
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.mirror)
    }
}

/// Per-task outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The body was persisted at this path.
    Success(PathBuf),
    Failure(FetchFailure),
}

/// Failed URIs of one batch, keyed by URI.
pub type ErrorMap = BTreeMap<String, FetchFailure>;

/// Result of one scheduler run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// URI -> failure for every task that failed.
    pub errors: ErrorMap,
    /// URIs fetched and persisted, in completion order.
    pub fulfilled: Vec<String>,
    /// Tasks whose destination already existed.
    pub skipped: usize,
    /// True when the producer ran out of tasks on its own.
    pub exhausted: bool,
    /// Upstream error that stopped the producer, if any.
    pub aborted: Option<MirrorError>,
}

impl BatchReport {
    /// Tasks that completed in any way.
    pub fn completed(&self) -> usize {
        self.errors.len() + self.fulfilled.len() + self.skipped
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_status() {
        let failure = FetchFailure::from_fetch_error(&FetchError::Status(503), "https://m1");
        assert_eq!(failure.kind, FailureKind::Status(503));
        assert_eq!(failure.mirror, "https://m1");
        assert_eq!(failure.to_string(), "HTTP 503 (https://m1)");
    }

    #[test]
    fn test_failure_from_timeout() {
        let failure = FetchFailure::from_fetch_error(&FetchError::Timeout, "https://m1");
        assert_eq!(failure.kind, FailureKind::Timeout);
    }

    #[test]
    fn test_batch_report_completed() {
        let mut report = BatchReport::default();
        report.fulfilled.push("p/a$1.json".to_string());
        report.skipped = 2;
        report.errors.insert(
            "p/b$2.json".to_string(),
            FetchFailure::new(FailureKind::Transport, "https://m1", "reset"),
        );
        assert_eq!(report.completed(), 4);
        assert!(report.has_errors());
    }
}
