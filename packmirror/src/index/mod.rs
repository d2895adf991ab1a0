//! Index normalization.
//!
//! The upstream repository is a two-level index: a root document mapping
//! shard names to hashes, and shards mapping package names to hashes. This
//! module parses both into validated schema types and turns them into
//! deduplicated, content-addressed download tasks.

mod normalize;
mod template;
mod types;

pub use normalize::{normalize, task_stream, TaskSet};
pub use template::{
    UriTemplate, DEFAULT_PACKAGE_TEMPLATE, DEFAULT_SHARD_TEMPLATE, HASH_PLACEHOLDER,
    NAME_PLACEHOLDER,
};
pub use types::{HashEntry, RootDocument, RootIndex, Shard};

pub(crate) use template::is_contained;
