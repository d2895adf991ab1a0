//! Change detection for the root index.
//!
//! The planner decides whether a run needs to fetch anything beyond the root
//! document. It compares the canonical hash of the freshly fetched root index
//! with the last published one, unless the mirror is bootstrapping.

use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::http::AsyncHttpClient;
use crate::index::{RootDocument, RootIndex, UriTemplate, NAME_PLACEHOLDER};
use crate::mirror::Endpoint;
use crate::store::MetadataStore;

/// Relative URI of the root document on the origin.
pub const ROOT_DOCUMENT: &str = "packages.json";

/// What the run has to do.
#[derive(Debug)]
pub enum Plan {
    /// The published root index matches the origin's.
    UpToDate { hash: String },
    /// Shards and packages must be synchronized.
    Proceed(PlannedSync),
}

/// Inputs for the fetch phases of a run that proceeds.
#[derive(Debug, Clone)]
pub struct PlannedSync {
    pub root: RootIndex,
    /// Canonical hash of `root`, already staged.
    pub root_hash: String,
    /// Full pass: every shard is processed and mirrors are engaged.
    pub bootstrap: bool,
    pub shard_template: UriTemplate,
    pub package_template: UriTemplate,
}

/// Fetches the root document and compares it to the published state.
pub struct SyncPlanner<'c, C> {
    client: &'c C,
    shard_template: String,
    package_template: String,
}

impl<'c, C: AsyncHttpClient> SyncPlanner<'c, C> {
    pub fn new(client: &'c C, config: &MirrorConfig) -> Self {
        Self {
            client,
            shard_template: config.shard_template.clone(),
            package_template: config.package_template.clone(),
        }
    }

    /// Plan a run against `origin`.
    ///
    /// The origin endpoint has already been validated, so no request is made
    /// for a syntactically invalid origin.
    pub async fn plan(&self, origin: &Endpoint, store: &MetadataStore) -> MirrorResult<Plan> {
        let url = origin.url_for(ROOT_DOCUMENT);
        tracing::debug!(url = %url, "Fetching root index");

        let body = self
            .client
            .get(&url)
            .await
            .map_err(|e| MirrorError::RootFetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let document = RootDocument::parse(&body, &url)?;
        let (shard_template, package_template) = self.templates(&document)?;

        if !store.public_tree_exists() {
            store.touch_bootstrap_marker()?;
        }

        let root_hash = document.index.canonical_hash()?;
        let last_hash = store.last_hash()?;
        let bootstrap = store.has_bootstrap_marker() || last_hash.is_none();

        if !bootstrap && last_hash.as_deref() == Some(root_hash.as_str()) {
            tracing::info!(hash = %root_hash, "Root index unchanged");
            return Ok(Plan::UpToDate { hash: root_hash });
        }

        store.stage_root_index(&document.index.canonical_json()?)?;
        tracing::info!(
            shards = document.index.len(),
            hash = %root_hash,
            bootstrap,
            "Root index changed"
        );

        Ok(Plan::Proceed(PlannedSync {
            root: document.index,
            root_hash,
            bootstrap,
            shard_template,
            package_template,
        }))
    }

    fn templates(&self, document: &RootDocument) -> MirrorResult<(UriTemplate, UriTemplate)> {
        // Composer shard names carry their own hash placeholder.
        let shard_template = if document.is_composer() {
            UriTemplate::new(NAME_PLACEHOLDER)?
        } else {
            UriTemplate::new(&self.shard_template)?
        };
        let package_template = match &document.providers_url {
            Some(providers_url) => UriTemplate::new(providers_url)?,
            None => UriTemplate::new(&self.package_template)?,
        };
        Ok((shard_template, package_template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockAsyncHttpClient;
    use crate::http::FetchError;
    use tempfile::TempDir;

    const ORIGIN: &str = "https://origin";
    const ROOT: &[u8] = br#"{"a":{"sha256":"H1"}}"#;

    fn setup() -> (TempDir, MetadataStore, Endpoint, MirrorConfig) {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path().join("out"));
        let config = MirrorConfig::new(ORIGIN, store.root());
        (temp, store, Endpoint::new(ORIGIN).unwrap(), config)
    }

    fn client(body: &[u8]) -> MockAsyncHttpClient {
        MockAsyncHttpClient::new().with_response("https://origin/packages.json", body.to_vec())
    }

    fn published(store: &MetadataStore, root: &[u8]) {
        let doc = RootDocument::parse(root, "packages.json").unwrap();
        std::fs::create_dir_all(store.public_root()).unwrap();
        std::fs::write(
            store.root().join(ROOT_DOCUMENT),
            doc.index.canonical_json().unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_first_run_is_bootstrap() {
        let (_temp, store, origin, config) = setup();
        let client = client(ROOT);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();

        match plan {
            Plan::Proceed(p) => {
                assert!(p.bootstrap);
                assert_eq!(p.root.len(), 1);
            }
            other => panic!("expected Proceed, got {:?}", other),
        }
        assert!(store.has_bootstrap_marker());
        assert!(store.is_staged(ROOT_DOCUMENT));
    }

    #[tokio::test]
    async fn test_unchanged_root_is_up_to_date() {
        let (_temp, store, origin, config) = setup();
        published(&store, ROOT);
        let client = client(ROOT);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();

        assert!(matches!(plan, Plan::UpToDate { .. }));
        assert!(!store.is_staged(ROOT_DOCUMENT));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_key_order_does_not_matter() {
        let (_temp, store, origin, config) = setup();
        published(&store, br#"{"a":{"sha256":"H1"},"b":{"sha256":"H2"}}"#);
        let client = client(br#"{"b":{"sha256":"H2"},"a":{"sha256":"H1"}}"#);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        assert!(matches!(plan, Plan::UpToDate { .. }));
    }

    #[tokio::test]
    async fn test_changed_root_proceeds_without_bootstrap() {
        let (_temp, store, origin, config) = setup();
        published(&store, ROOT);
        let client = client(br#"{"a":{"sha256":"H1"},"b":{"sha256":"H2"}}"#);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        match plan {
            Plan::Proceed(p) => assert!(!p.bootstrap),
            other => panic!("expected Proceed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_marker_forces_bootstrap_even_if_equal() {
        let (_temp, store, origin, config) = setup();
        published(&store, ROOT);
        store.touch_bootstrap_marker().unwrap();
        let client = client(ROOT);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        assert!(matches!(plan, Plan::Proceed(PlannedSync { bootstrap: true, .. })));
    }

    #[tokio::test]
    async fn test_missing_public_tree_forces_bootstrap() {
        let (_temp, store, origin, config) = setup();
        published(&store, ROOT);
        std::fs::remove_dir_all(store.public_root()).unwrap();
        let client = client(ROOT);

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        assert!(matches!(plan, Plan::Proceed(PlannedSync { bootstrap: true, .. })));
        assert!(store.has_bootstrap_marker());
    }

    #[tokio::test]
    async fn test_root_fetch_failure_is_fatal() {
        let (_temp, store, origin, config) = setup();
        let client = MockAsyncHttpClient::new().failing_prefix(ORIGIN, FetchError::Status(503));

        let err = SyncPlanner::new(&client, &config)
            .plan(&origin, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::RootFetch { .. }));
        assert!(!store.has_bootstrap_marker());
    }

    #[tokio::test]
    async fn test_malformed_root_is_fatal() {
        let (_temp, store, origin, config) = setup();
        let client = client(br#"{"a": "not an entry"}"#);

        let err = SyncPlanner::new(&client, &config)
            .plan(&origin, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::MalformedIndex { .. }));
    }

    #[tokio::test]
    async fn test_composer_root_uses_providers_url() {
        let (_temp, store, origin, config) = setup();
        let client = client(
            br#"{"providers-url": "/p/%package%$%hash%.json",
                 "provider-includes": {"p/provider-2024$%hash%.json": {"sha256": "abc"}}}"#,
        );

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        let Plan::Proceed(p) = plan else {
            panic!("expected Proceed");
        };
        assert_eq!(p.shard_template.pattern(), NAME_PLACEHOLDER);
        assert_eq!(p.package_template.pattern(), "p/%package%$%hash%.json");
        assert_eq!(
            p.shard_template.render("p/provider-2024$%hash%.json", "abc").unwrap(),
            "p/provider-2024$abc.json"
        );
    }

    #[tokio::test]
    async fn test_composer_root_without_providers_url_keeps_shard_names() {
        let (_temp, store, origin, config) = setup();
        let client = client(
            br#"{"packages": [],
                 "provider-includes": {"p/provider-2024$%hash%.json": {"sha256": "abc"}}}"#,
        );

        let plan = SyncPlanner::new(&client, &config).plan(&origin, &store).await.unwrap();
        let Plan::Proceed(p) = plan else {
            panic!("expected Proceed");
        };
        assert_eq!(p.shard_template.pattern(), NAME_PLACEHOLDER);
        assert_eq!(p.package_template.pattern(), config.package_template);
        assert_eq!(
            p.shard_template.render("p/provider-2024$%hash%.json", "abc").unwrap(),
            "p/provider-2024$abc.json"
        );
    }
}
