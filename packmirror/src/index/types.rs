//! Schema types for the root index and shard documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checksum::sha256_hex;
use crate::error::{MirrorError, MirrorResult};

/// A `{"sha256": "<hex>"}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub sha256: String,
}

impl HashEntry {
    pub fn new(sha256: impl Into<String>) -> Self {
        Self {
            sha256: sha256.into(),
        }
    }
}

/// Mapping from shard name to content hash.
///
/// Keys are kept sorted so the serialized form is canonical: two indexes with
/// the same entries serialize to the same bytes regardless of the order the
/// origin listed them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootIndex(BTreeMap<String, HashEntry>);

impl RootIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, sha256: impl Into<String>) {
        self.0.insert(name.into(), HashEntry::new(sha256));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &HashEntry)> {
        self.0.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Canonical pretty-printed JSON, as persisted in the last-hash file.
    pub fn canonical_json(&self) -> MirrorResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.0)
            .map_err(|e| MirrorError::malformed("root index", e.to_string()))
    }

    /// SHA-256 of [`RootIndex::canonical_json`].
    pub fn canonical_hash(&self) -> MirrorResult<String> {
        Ok(sha256_hex(&self.canonical_json()?))
    }
}

impl FromIterator<(String, HashEntry)> for RootIndex {
    fn from_iter<I: IntoIterator<Item = (String, HashEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The root document served by the origin.
///
/// Accepts either a bare `name -> {sha256}` mapping or a Composer-style
/// document whose `provider-includes` holds that mapping, in which case
/// `providers-url` (when present) is the package URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDocument {
    pub index: RootIndex,
    pub providers_url: Option<String>,
    composer: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRootDocument {
    Composer {
        #[serde(rename = "provider-includes")]
        provider_includes: RootIndex,
        #[serde(rename = "providers-url", default)]
        providers_url: Option<String>,
    },
    Plain(RootIndex),
}

impl RootDocument {
    /// Parse and validate a root document.
    pub fn parse(bytes: &[u8], source_uri: &str) -> MirrorResult<Self> {
        let raw: RawRootDocument = serde_json::from_slice(bytes).map_err(|e| {
            MirrorError::malformed(
                source_uri,
                format!(
                    "expected a name -> {{\"sha256\"}} mapping or a document with \
                     provider-includes ({})",
                    e
                ),
            )
        })?;

        Ok(match raw {
            RawRootDocument::Composer {
                provider_includes,
                providers_url,
            } => Self {
                index: provider_includes,
                providers_url,
                composer: true,
            },
            RawRootDocument::Plain(index) => Self {
                index,
                providers_url: None,
                composer: false,
            },
        })
    }

    /// Whether the index came from `provider-includes`, where shard names
    /// already carry their own `%hash%` placeholder. Independent of
    /// `providers-url`, which may be absent.
    pub fn is_composer(&self) -> bool {
        self.composer
    }
}

/// A shard (provider file): `{"providers": {name: {"sha256": ...}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Shard {
    pub providers: BTreeMap<String, HashEntry>,
}

impl Shard {
    pub fn parse(bytes: &[u8], source_uri: &str) -> MirrorResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| MirrorError::malformed(source_uri, e.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &HashEntry)> {
        self.providers
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }
}
