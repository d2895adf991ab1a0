//! Filesystem store for mirrored metadata.
//!
//! Layout under the output directory:
//!
//! ```text
//! <output>/
//!   packages.json        last successfully published root index
//!   .init                bootstrap marker (present while a full sync is unfinished)
//!   p/...                public tree served to clients
//!   .staging/
//!     packages.json      root index of the run in progress
//!     p/...              files fetched this run
//! ```
//!
//! Every write lands in `.staging`. [`MetadataStore::publish`] moves the staged
//! entries into place once the run has succeeded, so clients never observe a
//! half-updated tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checksum::{calculate_file_checksum, sha256_hex};
use crate::error::{MirrorError, MirrorResult};
use crate::index::is_contained;

/// Directory holding files written during the current run.
pub const STAGING_DIR: &str = ".staging";

/// Directory of the public tree.
pub const PUBLIC_DIR: &str = "p";

/// File holding the canonical root index of the last published run.
pub const LAST_HASH_FILE: &str = "packages.json";

/// Zero-length sentinel flagging an unfinished full sync.
pub const BOOTSTRAP_MARKER: &str = ".init";

/// Suffix for files being written, renamed into place once complete.
const PART_SUFFIX: &str = ".part";

/// What a publish moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Top-level or merged entries renamed into the public tree.
    pub entries_moved: usize,
    /// Whether the last-hash file was promoted.
    pub root_promoted: bool,
}

/// Staging/public metadata store rooted at the output directory.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    root: PathBuf,
}

impl MetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn public_root(&self) -> PathBuf {
        self.root.join(PUBLIC_DIR)
    }

    fn checked(uri: &str) -> MirrorResult<&str> {
        if is_contained(uri) {
            Ok(uri)
        } else {
            Err(MirrorError::InvalidPath(uri.to_string()))
        }
    }

    /// Path a URI is staged at.
    pub fn staging_path(&self, uri: &str) -> MirrorResult<PathBuf> {
        Ok(self.staging_root().join(Self::checked(uri)?))
    }

    /// Path a URI is published at.
    pub fn public_path(&self, uri: &str) -> MirrorResult<PathBuf> {
        Ok(self.root.join(Self::checked(uri)?))
    }

    /// Whether the URI is already present, staged or published.
    pub fn has(&self, uri: &str) -> bool {
        self.is_staged(uri) || self.public_path(uri).map_or(false, |p| p.is_file())
    }

    /// Whether the URI was written by a run that has not been published yet.
    pub fn is_staged(&self, uri: &str) -> bool {
        self.staging_path(uri).map_or(false, |p| p.is_file())
    }

    /// Read a URI, preferring the staged copy.
    pub fn read(&self, uri: &str) -> MirrorResult<Vec<u8>> {
        let staged = self.staging_path(uri)?;
        let path = if staged.is_file() {
            staged
        } else {
            self.public_path(uri)?
        };

        fs::read(&path).map_err(|e| MirrorError::ReadFailed { path, source: e })
    }

    /// Write a body into staging, returning its path.
    ///
    /// The body goes to a `.part` file first so an interrupted write never
    /// leaves a truncated file that [`MetadataStore::has`] would accept.
    pub fn write(&self, uri: &str, body: &[u8]) -> MirrorResult<PathBuf> {
        let path = self.staging_path(uri)?;
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let mut part = path.clone().into_os_string();
        part.push(PART_SUFFIX);
        let part = PathBuf::from(part);

        fs::write(&part, body).map_err(|e| MirrorError::WriteFailed {
            path: part.clone(),
            source: e,
        })?;
        move_path(&part, &path)?;

        Ok(path)
    }

    /// SHA-256 of a buffer, as used for root index comparison.
    pub fn hash(&self, bytes: &[u8]) -> String {
        sha256_hex(bytes)
    }

    /// Hash of the published last-hash file, if there is one.
    pub fn last_hash(&self) -> MirrorResult<Option<String>> {
        let path = self.root.join(LAST_HASH_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        calculate_file_checksum(&path).map(Some)
    }

    /// Stage the canonical root index for promotion on publish.
    pub fn stage_root_index(&self, canonical: &[u8]) -> MirrorResult<PathBuf> {
        self.write(LAST_HASH_FILE, canonical)
    }

    pub fn public_tree_exists(&self) -> bool {
        self.public_root().is_dir()
    }

    pub fn has_bootstrap_marker(&self) -> bool {
        self.root.join(BOOTSTRAP_MARKER).exists()
    }

    pub fn touch_bootstrap_marker(&self) -> MirrorResult<()> {
        create_dir_all(&self.root)?;
        let path = self.root.join(BOOTSTRAP_MARKER);
        fs::write(&path, b"").map_err(|e| MirrorError::WriteFailed { path, source: e })
    }

    pub fn clear_bootstrap_marker(&self) -> MirrorResult<()> {
        let path = self.root.join(BOOTSTRAP_MARKER);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MirrorError::RemoveFailed { path, source: e }),
        }
    }

    /// Promote staged files to the public tree.
    ///
    /// A staged directory whose destination does not exist yet is moved with
    /// one rename, so a first run publishes the whole tree at once. Otherwise
    /// entries are merged file by file. The staged last-hash file is promoted
    /// after the tree, then staging is removed and the bootstrap marker
    /// cleared.
    pub fn publish(&self) -> MirrorResult<PublishReport> {
        let staging = self.staging_root();
        let mut report = PublishReport::default();

        if staging.is_dir() {
            for entry in read_dir(&staging)? {
                let name = entry.file_name();
                if name == LAST_HASH_FILE {
                    continue;
                }
                merge(&entry.path(), &self.root.join(&name), &mut report)?;
            }

            let staged_root = staging.join(LAST_HASH_FILE);
            if staged_root.is_file() {
                move_path(&staged_root, &self.root.join(LAST_HASH_FILE))?;
                report.root_promoted = true;
            }

            fs::remove_dir_all(&staging).map_err(|e| MirrorError::RemoveFailed {
                path: staging.clone(),
                source: e,
            })?;
        }

        self.clear_bootstrap_marker()?;

        tracing::debug!(
            entries = report.entries_moved,
            root_promoted = report.root_promoted,
            "Published staging tree"
        );
        Ok(report)
    }
}

fn merge(src: &Path, dst: &Path, report: &mut PublishReport) -> MirrorResult<()> {
    if !dst.exists() {
        move_path(src, dst)?;
        report.entries_moved += 1;
        return Ok(());
    }

    if src.is_dir() && dst.is_dir() {
        for entry in read_dir(src)? {
            merge(&entry.path(), &dst.join(entry.file_name()), report)?;
        }
        return Ok(());
    }

    // Content-addressed: a file at the same path has the same content, but
    // the staged copy replaces it anyway.
    if dst.is_dir() {
        fs::remove_dir_all(dst).map_err(|e| MirrorError::RemoveFailed {
            path: dst.to_path_buf(),
            source: e,
        })?;
    }
    move_path(src, dst)?;
    report.entries_moved += 1;
    Ok(())
}

fn read_dir(path: &Path) -> MirrorResult<Vec<fs::DirEntry>> {
    let entries = fs::read_dir(path).map_err(|e| MirrorError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    entries
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MirrorError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

fn create_dir_all(path: &Path) -> MirrorResult<()> {
    fs::create_dir_all(path).map_err(|e| MirrorError::CreateDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn move_path(from: &Path, to: &Path) -> MirrorResult<()> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    fs::rename(from, to).map_err(|e| MirrorError::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MetadataStore) {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("out"));
        (temp, store)
    }

    #[test]
    fn test_write_goes_to_staging() {
        let (_temp, store) = store();
        let path = store.write("p/acme/tool$aa.json", b"{}").unwrap();

        assert!(path.starts_with(store.staging_root()));
        assert!(store.has("p/acme/tool$aa.json"));
        assert!(store.is_staged("p/acme/tool$aa.json"));
        assert!(!store.public_path("p/acme/tool$aa.json").unwrap().exists());
        assert_eq!(store.read("p/acme/tool$aa.json").unwrap(), b"{}".to_vec());
    }

    #[test]
    fn test_write_leaves_no_part_file() {
        let (_temp, store) = store();
        let path = store.write("p/a$1.json", b"x").unwrap();
        let mut part = path.into_os_string();
        part.push(PART_SUFFIX);
        assert!(!PathBuf::from(part).exists());
    }

    #[test]
    fn test_write_rejects_escaping_uri() {
        let (_temp, store) = store();
        assert!(matches!(
            store.write("../escape.json", b"x"),
            Err(MirrorError::InvalidPath(_))
        ));
        assert!(!store.has("../escape.json"));
    }

    #[test]
    fn test_publish_first_run_moves_tree() {
        let (_temp, store) = store();
        store.write("p/a$1.json", b"a").unwrap();
        store.write("p/b/c$2.json", b"c").unwrap();
        store.stage_root_index(b"{}").unwrap();
        store.touch_bootstrap_marker().unwrap();

        let report = store.publish().unwrap();

        // The whole `p` directory moves with one rename.
        assert_eq!(report.entries_moved, 1);
        assert!(report.root_promoted);
        assert!(store.public_tree_exists());
        assert!(!store.staging_root().exists());
        assert!(!store.has_bootstrap_marker());
        assert_eq!(store.read("p/b/c$2.json").unwrap(), b"c".to_vec());
        assert!(!store.is_staged("p/b/c$2.json"));
    }

    #[test]
    fn test_publish_merges_into_existing_tree() {
        let (_temp, store) = store();
        store.write("p/a$1.json", b"a").unwrap();
        store.publish().unwrap();

        store.write("p/b$2.json", b"b").unwrap();
        store.write("p/a$1.json", b"a").unwrap();
        let report = store.publish().unwrap();

        assert_eq!(report.entries_moved, 2);
        assert!(!report.root_promoted);
        assert_eq!(store.read("p/a$1.json").unwrap(), b"a".to_vec());
        assert_eq!(store.read("p/b$2.json").unwrap(), b"b".to_vec());
    }

    #[test]
    fn test_publish_without_staging_is_noop() {
        let (_temp, store) = store();
        let report = store.publish().unwrap();
        assert_eq!(report, PublishReport::default());
    }

    #[test]
    fn test_last_hash_matches_staged_bytes() {
        let (_temp, store) = store();
        assert_eq!(store.last_hash().unwrap(), None);

        store.stage_root_index(b"{\n  \"a\": 1\n}").unwrap();
        store.publish().unwrap();

        assert_eq!(
            store.last_hash().unwrap(),
            Some(store.hash(b"{\n  \"a\": 1\n}"))
        );
    }

    #[test]
    fn test_bootstrap_marker_lifecycle() {
        let (_temp, store) = store();
        assert!(!store.has_bootstrap_marker());
        store.touch_bootstrap_marker().unwrap();
        assert!(store.has_bootstrap_marker());
        store.clear_bootstrap_marker().unwrap();
        store.clear_bootstrap_marker().unwrap();
        assert!(!store.has_bootstrap_marker());
    }
}
