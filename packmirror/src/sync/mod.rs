//! Sync runs: planning, the two fetch phases, publishing and cleanup.

mod clean;
mod orchestrator;
mod planner;

pub use clean::{clean, referenced_uris, CleanReport};
pub use orchestrator::{
    clean_published, NoopObserver, Orchestrator, ShardSummary, SyncObserver, SyncPhase,
    SyncStatus, SyncSummary,
};
pub use planner::{Plan, PlannedSync, SyncPlanner, ROOT_DOCUMENT};
