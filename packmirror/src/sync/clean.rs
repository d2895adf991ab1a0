//! Removal of metadata no longer referenced by the published root index.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{MirrorError, MirrorResult};
use crate::index::{normalize, RootIndex, Shard, UriTemplate};
use crate::store::{MetadataStore, LAST_HASH_FILE, STAGING_DIR};

/// Result of a clean pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Number of files deleted.
    pub files_removed: usize,
    /// Total bytes freed.
    pub bytes_freed: u64,
    /// Number of referenced files left in place.
    pub files_kept: usize,
    /// True when nothing was referenced and the pass refused to delete.
    pub refused: bool,
}

/// Every URI reachable from `root`: its shards and their packages.
///
/// Shards are read from the store, so this must run after publish.
pub fn referenced_uris(
    store: &MetadataStore,
    root: &RootIndex,
    shard_template: &UriTemplate,
    package_template: &UriTemplate,
) -> MirrorResult<HashSet<String>> {
    let mut referenced = HashSet::new();

    for shard in normalize(root.entries(), shard_template)?.iter() {
        let body = store.read(&shard.uri)?;
        let parsed = Shard::parse(&body, &shard.uri)?;
        for package in normalize(parsed.entries(), package_template)?.iter() {
            referenced.insert(package.uri.clone());
        }
        referenced.insert(shard.uri.clone());
    }

    Ok(referenced)
}

/// Delete every `*.json` file under the output root that is not referenced.
///
/// The staging directory and the last-hash file are never touched. An empty
/// reference set deletes nothing.
pub fn clean(store: &MetadataStore, referenced: &HashSet<String>) -> MirrorResult<CleanReport> {
    if referenced.is_empty() {
        tracing::warn!("No referenced files, refusing to clean");
        return Ok(CleanReport {
            refused: true,
            ..Default::default()
        });
    }

    let root = store.root();
    let pattern = format!("{}/**/*.json", glob::Pattern::escape(&root.to_string_lossy()));
    let entries = glob::glob(&pattern).map_err(|e| MirrorError::InvalidPath(e.to_string()))?;

    let mut report = CleanReport::default();
    for entry in entries {
        let path = entry.map_err(|e| MirrorError::ReadFailed {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;

        let Some(uri) = relative_uri(root, &path) else {
            continue;
        };
        if uri == LAST_HASH_FILE || uri.starts_with(&format!("{}/", STAGING_DIR)) {
            continue;
        }
        if referenced.contains(&uri) {
            report.files_kept += 1;
            continue;
        }

        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        fs::remove_file(&path).map_err(|e| MirrorError::RemoveFailed {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(uri = %uri, bytes = size, "Removed unreferenced file");

        report.files_removed += 1;
        report.bytes_freed += size;
    }

    tracing::info!(
        removed = report.files_removed,
        bytes = report.bytes_freed,
        kept = report.files_kept,
        "Clean finished"
    );
    Ok(report)
}

/// Path relative to `root`, with `/` separators.
fn relative_uri(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.iter().map(|c| c.to_str()).collect();
    Some(parts?.join("/"))
}
