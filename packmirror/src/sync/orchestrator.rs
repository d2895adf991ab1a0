//! Two-phase sync run.
//!
//! # Phases
//!
//! ```text
//! Init -> Planning --(up to date)--> Done
//!            |
//!            v
//!        ShardFetch --(nothing changed)--------+
//!            |                                 |
//!            v                                 v
//!        PackageFetch (per shard) ---------> Publish -> Clean -> Done
//! ```
//!
//! When no shard changed, the run skips PackageFetch but still goes through
//! Publish rather than straight to Done, so the last-hash file follows the
//! new root index and the next run can report up to date.
//!
//! Planning fails fast on an invalid origin or a malformed root document. A
//! malformed shard aborts the run. Failed shard fetches leave the run
//! unpublished so the next run retries them; failed package fetches are
//! retried once on the origin and otherwise only reported.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::fetch::{
    run_fallback, ErrorMap, FallbackReport, FetchFailure, FetchScheduler, ProgressSink,
};
use crate::http::AsyncHttpClient;
use crate::index::{
    normalize, task_stream, RootDocument, Shard, UriTemplate, HASH_PLACEHOLDER, NAME_PLACEHOLDER,
};
use crate::mirror::{HealthTracker, MirrorNotice, Route, SyncContext};
use crate::store::{MetadataStore, PublishReport, LAST_HASH_FILE};

use super::clean::{clean, referenced_uris, CleanReport};
use super::planner::{Plan, PlannedSync, SyncPlanner};

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Init,
    Planning,
    ShardFetch,
    PackageFetch,
    Publish,
    Clean,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Init => "init",
            SyncPhase::Planning => "planning",
            SyncPhase::ShardFetch => "shard fetch",
            SyncPhase::PackageFetch => "package fetch",
            SyncPhase::Publish => "publish",
            SyncPhase::Clean => "clean",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// The root index was unchanged; nothing beyond it was fetched.
    #[default]
    UpToDate,
    /// The root index changed but no shard did.
    ShardsUpToDate,
    /// New metadata was fetched and published.
    Updated,
    /// Some shards could not be fetched; nothing was published.
    Incomplete,
}

/// Outcome of one shard's package pass.
#[derive(Debug, Clone, Default)]
pub struct ShardSummary {
    pub uri: String,
    pub fetched: usize,
    pub skipped: usize,
    /// Failures before fallback.
    pub failed: usize,
    pub recovered: usize,
    pub final_errors: ErrorMap,
}

/// Result of a run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub status: SyncStatus,
    pub bootstrap: bool,
    /// Phases entered, in order.
    pub phases: Vec<SyncPhase>,
    pub root_hash: Option<String>,
    pub shards_total: usize,
    pub shards_fetched: usize,
    /// Shard fetch failures; any entry keeps the run unpublished.
    pub shard_errors: ErrorMap,
    pub shards: Vec<ShardSummary>,
    pub notices: Vec<MirrorNotice>,
    /// Cumulative fetch errors per host, origin included.
    pub mirror_errors: Vec<(String, usize)>,
    pub publish: Option<PublishReport>,
    pub clean: Option<CleanReport>,
}

impl SyncSummary {
    pub fn packages_fetched(&self) -> usize {
        self.shards.iter().map(|s| s.fetched + s.recovered).sum()
    }

    /// Package failures that survived fallback, across all shards.
    pub fn final_failures(&self) -> impl Iterator<Item = (&str, &FetchFailure)> {
        self.shards
            .iter()
            .flat_map(|s| s.final_errors.iter().map(|(uri, f)| (uri.as_str(), f)))
    }

    pub fn final_failure_count(&self) -> usize {
        self.shards.iter().map(|s| s.final_errors.len()).sum()
    }
}

/// Status events for user-facing output. All methods default to no-ops.
pub trait SyncObserver {
    fn on_phase(&mut self, _phase: SyncPhase) {}
    fn on_shard_start(&mut self, _index: usize, _total: usize, _uri: &str) {}
    fn on_batch_errors(&mut self, _errors: &ErrorMap) {}
    fn on_mirror_notice(&mut self, _notice: &MirrorNotice) {}
    fn on_fallback(&mut self, _report: &FallbackReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Drives one sync run.
pub struct Orchestrator<'c, C> {
    client: &'c C,
    config: MirrorConfig,
    store: MetadataStore,
}

impl<'c, C: AsyncHttpClient> Orchestrator<'c, C> {
    pub fn new(client: &'c C, config: MirrorConfig) -> Self {
        let store = MetadataStore::new(&config.output_dir);
        Self {
            client,
            config,
            store,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Run a full sync.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unavailable or malformed root document, a
    /// malformed shard, storage failures during publish, and clean failures.
    /// Individual fetch failures are reported in the summary instead.
    pub async fn run<P, O>(&self, progress: &mut P, observer: &mut O) -> MirrorResult<SyncSummary>
    where
        P: ProgressSink + ?Sized,
        O: SyncObserver + ?Sized,
    {
        let mut summary = SyncSummary::default();

        enter(&mut summary, observer, SyncPhase::Init);
        let mut ctx = SyncContext::from_config(&self.config)?;
        let scheduler = FetchScheduler::new(self.client)
            .with_concurrency(self.config.max_connections)
            .with_checksums(self.config.verify_checksums);

        enter(&mut summary, observer, SyncPhase::Planning);
        let planner = SyncPlanner::new(self.client, &self.config);
        let planned = match planner.plan(ctx.mirrors.origin(), &self.store).await? {
            Plan::UpToDate { hash } => {
                summary.root_hash = Some(hash);
                summary.status = SyncStatus::UpToDate;
                enter(&mut summary, observer, SyncPhase::Done);
                return Ok(summary);
            }
            Plan::Proceed(planned) => planned,
        };
        summary.bootstrap = planned.bootstrap;
        summary.root_hash = Some(planned.root_hash.clone());

        enter(&mut summary, observer, SyncPhase::ShardFetch);
        let shards = normalize(planned.root.entries(), &planned.shard_template)?;
        summary.shards_total = shards.len();

        let mut report = scheduler
            .run(&mut ctx, &self.store, shards.stream(), Route::Origin, progress)
            .await;
        if let Some(error) = report.aborted.take() {
            return Err(error);
        }
        if report.has_errors() {
            observer.on_batch_errors(&report.errors);
        }
        summary.shards_fetched = report.fulfilled.len();
        summary.shard_errors = report.errors;

        // Staged shards are those fetched now or left by an interrupted run.
        let to_process: Vec<&str> = shards
            .iter()
            .map(|t| t.uri.as_str())
            .filter(|uri| {
                if planned.bootstrap {
                    self.store.has(uri)
                } else {
                    self.store.is_staged(uri)
                }
            })
            .collect();

        tracing::info!(
            total = summary.shards_total,
            fetched = summary.shards_fetched,
            failed = summary.shard_errors.len(),
            to_process = to_process.len(),
            "Shard fetch finished"
        );

        let shards_unchanged = report.exhausted && !planned.bootstrap && to_process.is_empty();
        if !shards_unchanged {
            enter(&mut summary, observer, SyncPhase::PackageFetch);
            self.fetch_packages(
                &scheduler,
                &mut ctx,
                &planned,
                &to_process,
                &mut summary,
                progress,
                observer,
            )
            .await?;
        }

        summary.mirror_errors = ctx
            .errors
            .iter()
            .map(|(host, count)| (host.to_string(), count))
            .collect();

        if !summary.shard_errors.is_empty() {
            tracing::warn!(
                failed = summary.shard_errors.len(),
                "Shard fetches failed, leaving the run unpublished"
            );
            summary.status = SyncStatus::Incomplete;
            enter(&mut summary, observer, SyncPhase::Done);
            return Ok(summary);
        }

        enter(&mut summary, observer, SyncPhase::Publish);
        summary.publish = Some(self.store.publish()?);
        summary.status = if shards_unchanged {
            SyncStatus::ShardsUpToDate
        } else {
            SyncStatus::Updated
        };

        if self.config.clean {
            enter(&mut summary, observer, SyncPhase::Clean);
            let referenced = referenced_uris(
                &self.store,
                &planned.root,
                &planned.shard_template,
                &planned.package_template,
            )?;
            summary.clean = Some(clean(&self.store, &referenced)?);
        }

        enter(&mut summary, observer, SyncPhase::Done);
        tracing::info!(
            status = ?summary.status,
            packages = summary.packages_fetched(),
            failures = summary.final_failure_count(),
            fetch_errors = ctx.errors.total(),
            "Sync finished"
        );
        Ok(summary)
    }

    /// Package pass over each shard, strictly one shard at a time.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_packages<P, O>(
        &self,
        scheduler: &FetchScheduler<'c, C>,
        ctx: &mut SyncContext,
        planned: &PlannedSync,
        shards: &[&str],
        summary: &mut SyncSummary,
        progress: &mut P,
        observer: &mut O,
    ) -> MirrorResult<()>
    where
        P: ProgressSink + ?Sized,
        O: SyncObserver + ?Sized,
    {
        // Mirrors serve full syncs; incremental runs go to the origin.
        let route = if planned.bootstrap {
            Route::Preferred
        } else {
            Route::Origin
        };
        let tracker = HealthTracker::new(self.config.verbose);

        for (index, &uri) in shards.iter().enumerate() {
            observer.on_shard_start(index, shards.len(), uri);

            let body = self.store.read(uri)?;
            let shard = Shard::parse(&body, uri)?;

            let mut report = scheduler
                .run(
                    ctx,
                    &self.store,
                    task_stream(shard.entries(), &planned.package_template),
                    route,
                    progress,
                )
                .await;
            if let Some(error) = report.aborted.take() {
                return Err(error);
            }
            if report.has_errors() {
                observer.on_batch_errors(&report.errors);
            }

            for notice in tracker.observe(ctx) {
                observer.on_mirror_notice(&notice);
                summary.notices.push(notice);
            }

            let fallback = if report.has_errors() {
                let tasks = normalize(shard.entries(), &planned.package_template)?;
                let fallback =
                    run_fallback(scheduler, ctx, &self.store, &tasks, &report.errors, progress)
                        .await;
                observer.on_fallback(&fallback);
                fallback
            } else {
                FallbackReport::default()
            };

            tracing::info!(
                shard = %uri,
                fetched = report.fulfilled.len(),
                skipped = report.skipped,
                failed = report.errors.len(),
                recovered = fallback.recovered.len(),
                "Shard processed"
            );

            summary.shards.push(ShardSummary {
                uri: uri.to_string(),
                fetched: report.fulfilled.len(),
                skipped: report.skipped,
                failed: report.errors.len(),
                recovered: fallback.recovered.len(),
                final_errors: fallback.final_errors,
            });
        }

        Ok(())
    }
}

fn enter<O: SyncObserver + ?Sized>(summary: &mut SyncSummary, observer: &mut O, phase: SyncPhase) {
    tracing::debug!(phase = %phase, "Entering phase");
    summary.phases.push(phase);
    observer.on_phase(phase);
}

/// Clean a published mirror against its own last-hash file.
///
/// Used by the standalone `clean` command. The last-hash file holds only the
/// root index, so the given templates are used, except that shard names
/// carrying their own hash placeholder render as-is.
pub fn clean_published(
    output_dir: &Path,
    shard_template: &str,
    package_template: &str,
) -> MirrorResult<CleanReport> {
    let store = MetadataStore::new(output_dir);
    let root_path = store.root().join(LAST_HASH_FILE);
    let body = std::fs::read(&root_path).map_err(|e| MirrorError::ReadFailed {
        path: root_path.clone(),
        source: e,
    })?;
    let root = RootDocument::parse(&body, LAST_HASH_FILE)?.index;

    let self_hashed = root.entries().any(|(name, _)| name.contains(HASH_PLACEHOLDER));
    let shard_template = if self_hashed {
        UriTemplate::new(NAME_PLACEHOLDER)?
    } else {
        UriTemplate::new(shard_template)?
    };
    let package_template = UriTemplate::new(package_template)?;

    let referenced: HashSet<String> =
        referenced_uris(&store, &root, &shard_template, &package_template)?;
    clean(&store, &referenced)
}
