//! Content-addressed URI templates.
//!
//! A template such as `p/%package%$%hash%.json` maps a `(name, hash)` pair to
//! a relative URI. The same pair always renders to the same URI, so the
//! presence of the rendered file is equivalent to "already fetched".

use std::fmt;

use crate::error::{MirrorError, MirrorResult};

/// Placeholder replaced by the entry name.
pub const NAME_PLACEHOLDER: &str = "%package%";

/// Placeholder replaced by the entry hash.
pub const HASH_PLACEHOLDER: &str = "%hash%";

/// Default template for shard files.
pub const DEFAULT_SHARD_TEMPLATE: &str = "p/%package%$%hash%.json";

/// Default template for package manifests.
pub const DEFAULT_PACKAGE_TEMPLATE: &str = "p/%package%$%hash%.json";

/// A two-placeholder URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    pattern: String,
}

impl UriTemplate {
    /// Create a template, stripping any leading `/` so rendered URIs are
    /// relative to the mirror root.
    pub fn new(pattern: impl AsRef<str>) -> MirrorResult<Self> {
        let pattern = pattern.as_ref().trim().trim_start_matches('/');

        if !pattern.contains(NAME_PLACEHOLDER) {
            return Err(MirrorError::malformed(
                pattern,
                format!("uri template must contain {}", NAME_PLACEHOLDER),
            ));
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render the URI for one entry.
    ///
    /// The name may carry its own `%hash%` placeholder (Composer
    /// `provider-includes` keys do); the result must contain the hash
    /// either way.
    pub fn render(&self, name: &str, hash: &str) -> MirrorResult<String> {
        if name.is_empty() {
            return Err(MirrorError::malformed(&self.pattern, "empty entry name"));
        }
        if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(MirrorError::malformed(
                name,
                format!("invalid hash '{}'", hash),
            ));
        }

        let with_name = self.pattern.replace(NAME_PLACEHOLDER, name);
        if !with_name.contains(HASH_PLACEHOLDER) {
            return Err(MirrorError::malformed(
                name,
                format!(
                    "'{}' has no {} placeholder, uri would not be content-addressed",
                    with_name, HASH_PLACEHOLDER
                ),
            ));
        }

        let uri = with_name.replace(HASH_PLACEHOLDER, hash);
        if !is_contained(&uri) {
            return Err(MirrorError::malformed(
                name,
                format!("'{}' escapes the mirror root", uri),
            ));
        }

        Ok(uri)
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Whether a relative URI stays inside the mirror root.
pub(crate) fn is_contained(uri: &str) -> bool {
    !uri.starts_with('/')
        && !uri.contains('\\')
        && uri
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
