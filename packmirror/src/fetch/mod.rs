//! Fetch scheduling and fallback.
//!
//! [`FetchScheduler`] runs a lazily produced stream of [`FetchTask`]s with a
//! bounded number of requests in flight. [`run_fallback`] re-issues a batch's
//! failures against the origin, once.

mod fallback;
mod progress;
mod scheduler;
mod task;

pub use fallback::{run_fallback, FallbackReport};
pub use progress::{CountingProgress, NoopProgress, ProgressSink};
pub use scheduler::{FetchScheduler, DEFAULT_MAX_CONNECTIONS};
pub use task::{BatchReport, ErrorMap, FailureKind, FetchFailure, FetchOutcome, FetchTask};
