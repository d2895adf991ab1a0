//! Mirror selection and health.
//!
//! [`SyncContext`] carries the mirror set and the cumulative error counters
//! for one run. The scheduler reads it to route requests, and the
//! [`HealthTracker`] disables mirrors that exceed the error limit.

mod context;
mod counter;
mod endpoint;
mod health;

pub use context::{Route, SyncContext, Target, DEFAULT_ERROR_LIMIT};
pub use counter::ErrorCounter;
pub use endpoint::{parse_base_uri, Endpoint, MirrorSet};
pub use health::{HealthTracker, MirrorNotice};
