//! packmirror - mirror engine for two-level package metadata repositories
//!
//! The upstream repository publishes a root index of shard hashes, shards of
//! package hashes, and one manifest per package version set. This library
//! keeps a local copy of that tree up to date:
//!
//! - [`sync::SyncPlanner`] skips the run entirely when the root index is
//!   unchanged
//! - [`fetch::FetchScheduler`] downloads shards, then packages, with a bounded
//!   number of requests in flight
//! - [`mirror::HealthTracker`] disables secondary mirrors that keep failing
//! - [`fetch::run_fallback`] retries a shard's failed packages on the origin
//! - [`store::MetadataStore`] stages everything and publishes it in one step
//!
//! [`sync::Orchestrator`] ties these together.

pub mod checksum;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod index;
pub mod logging;
pub mod mirror;
pub mod store;
pub mod sync;

pub use config::{ConfigFile, MirrorConfig};
pub use error::{MirrorError, MirrorResult};
pub use http::{AsyncHttpClient, ReqwestClient};
pub use sync::{Orchestrator, SyncObserver, SyncStatus, SyncSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
