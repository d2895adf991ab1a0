//! Bounded-concurrency fetch scheduling.
//!
//! The scheduler keeps a sliding window of at most `concurrency` requests:
//! 1. Pull tasks from the producer until the window is full
//! 2. Wait for any request to finish and record its outcome
//! 3. Refill the freed slot before waiting again
//!
//! Tasks whose destination already exists are skipped without a request. A
//! failed task is recorded in the batch error map and counted against the
//! mirror it was routed to; it never stops the batch. Only an `Err` from the
//! producer stops intake, and even then in-flight requests drain first.

use futures::stream::{FuturesUnordered, Stream, StreamExt};

use super::progress::ProgressSink;
use super::task::{BatchReport, FailureKind, FetchFailure, FetchOutcome, FetchTask};
use crate::checksum::{digests_match, sha256_hex};
use crate::error::MirrorResult;
use crate::http::{AsyncHttpClient, FetchError};
use crate::mirror::{Route, SyncContext, Target};
use crate::store::MetadataStore;

/// Default number of requests in flight.
pub const DEFAULT_MAX_CONNECTIONS: usize = 25;

/// Runs batches of fetch tasks against a client.
pub struct FetchScheduler<'c, C> {
    client: &'c C,
    concurrency: usize,
    verify_checksums: bool,
}

impl<'c, C: AsyncHttpClient> FetchScheduler<'c, C> {
    pub fn new(client: &'c C) -> Self {
        Self {
            client,
            concurrency: DEFAULT_MAX_CONNECTIONS,
            verify_checksums: true,
        }
    }

    /// Set the window size. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task the producer yields.
    ///
    /// `progress.progress()` is called exactly once per task, whether it was
    /// skipped, fetched or failed.
    pub async fn run<S, P>(
        &self,
        ctx: &mut SyncContext,
        store: &MetadataStore,
        mut tasks: S,
        route: Route,
        progress: &mut P,
    ) -> BatchReport
    where
        S: Stream<Item = MirrorResult<FetchTask>> + Unpin,
        P: ProgressSink + ?Sized,
    {
        let (_, upper) = tasks.size_hint();
        progress.start(upper);

        let mut report = BatchReport::default();
        let mut in_flight = FuturesUnordered::new();
        let mut producing = true;

        loop {
            while producing && in_flight.len() < self.concurrency {
                match tasks.next().await {
                    Some(Ok(task)) => {
                        if store.has(&task.uri) {
                            report.skipped += 1;
                            progress.progress();
                            continue;
                        }
                        let target = ctx.select(route);
                        in_flight.push(self.fetch(task, target));
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Task producer failed, draining in-flight requests");
                        report.aborted = Some(e);
                        producing = false;
                    }
                    None => {
                        report.exhausted = true;
                        producing = false;
                    }
                }
            }

            let Some((task, target, result)) = in_flight.next().await else {
                break;
            };

            match self.complete(store, &task, &target, result) {
                FetchOutcome::Success(path) => {
                    tracing::trace!(uri = %task.uri, path = %path.display(), "Fetched");
                    report.fulfilled.push(task.uri);
                }
                FetchOutcome::Failure(failure) => {
                    let errors = ctx.errors.record(&target.host_key);
                    tracing::debug!(
                        uri = %task.uri,
                        mirror = %target.base_uri,
                        errors,
                        error = %failure.message,
                        "Fetch failed"
                    );
                    report.errors.insert(task.uri, failure);
                }
            }
            progress.progress();
        }

        progress.end();

        tracing::debug!(
            fetched = report.fulfilled.len(),
            skipped = report.skipped,
            failed = report.errors.len(),
            exhausted = report.exhausted,
            "Batch finished"
        );
        report
    }

    async fn fetch(
        &self,
        task: FetchTask,
        target: Target,
    ) -> (FetchTask, Target, Result<Vec<u8>, FetchError>) {
        let url = target.url_for(&task.uri);
        let result = self.client.get(&url).await;
        (task, target, result)
    }

    fn complete(
        &self,
        store: &MetadataStore,
        task: &FetchTask,
        target: &Target,
        result: Result<Vec<u8>, FetchError>,
    ) -> FetchOutcome {
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                return FetchOutcome::Failure(FetchFailure::from_fetch_error(&e, &target.base_uri))
            }
        };

        if self.verify_checksums {
            let actual = sha256_hex(&body);
            if !digests_match(&task.hash, &actual) {
                return FetchOutcome::Failure(FetchFailure::new(
                    FailureKind::Checksum,
                    &target.base_uri,
                    format!("checksum mismatch: expected {}, got {}", task.hash, actual),
                ));
            }
        }

        match store.write(&task.uri, &body) {
            Ok(path) => FetchOutcome::Success(path),
            Err(e) => FetchOutcome::Failure(FetchFailure::new(
                FailureKind::Write,
                &target.base_uri,
                e.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::fetch::CountingProgress;
    use crate::http::tests::MockAsyncHttpClient;
    use crate::index::TaskSet;
    use crate::mirror::MirrorSet;
    use futures::stream;
    use std::time::Duration;
    use tempfile::TempDir;

    const ORIGIN: &str = "https://origin";
    const MIRROR: &str = "https://m1";

    fn task_set(n: usize) -> (TaskSet, Vec<(String, Vec<u8>)>) {
        let mut set = TaskSet::new();
        let mut bodies = Vec::new();
        for i in 0..n {
            let body = format!("{{\"n\":{}}}", i).into_bytes();
            let hash = sha256_hex(&body);
            let uri = format!("p/pkg{}${}.json", i, hash);
            set.insert(FetchTask::new(uri.clone(), hash));
            bodies.push((uri, body));
        }
        (set, bodies)
    }

    fn serve(mut mock: MockAsyncHttpClient, base: &str, bodies: &[(String, Vec<u8>)]) -> MockAsyncHttpClient {
        for (uri, body) in bodies {
            mock = mock.with_response(format!("{}/{}", base, uri), body.clone());
        }
        mock
    }

    fn context(mirrors: &[&str]) -> SyncContext {
        SyncContext::new(MirrorSet::new(ORIGIN, mirrors).unwrap())
    }

    #[tokio::test]
    async fn test_fetches_all_and_persists() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(5);
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies);
        let mut ctx = context(&[]);
        let mut progress = CountingProgress::default();

        let report = FetchScheduler::new(&client)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut progress)
            .await;

        assert_eq!(report.fulfilled.len(), 5);
        assert!(report.errors.is_empty());
        assert!(report.exhausted);
        assert!(report.aborted.is_none());
        assert_eq!(progress.total, Some(5));
        assert_eq!(progress.ticks, 5);
        assert_eq!(progress.ended, 1);
        for (uri, body) in &bodies {
            assert_eq!(&store.read(uri).unwrap(), body);
        }
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(3);
        store.write(&bodies[0].0, &bodies[0].1).unwrap();
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies);
        let mut ctx = context(&[]);
        let mut progress = CountingProgress::default();

        let report = FetchScheduler::new(&client)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut progress)
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.fulfilled.len(), 2);
        assert_eq!(client.requests().len(), 2);
        assert_eq!(progress.ticks, 3);
    }

    #[tokio::test]
    async fn test_window_never_exceeds_concurrency() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(20);
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies)
            .with_delay(Duration::from_millis(2));
        let mut ctx = context(&[]);

        let report = FetchScheduler::new(&client)
            .with_concurrency(4)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut CountingProgress::default())
            .await;

        assert_eq!(report.fulfilled.len(), 20);
        assert_eq!(client.peak_in_flight(), 4);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_fatal() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(6);
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies[..3]);
        let mut ctx = context(&[]);

        let report = FetchScheduler::new(&client)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut CountingProgress::default())
            .await;

        assert_eq!(report.fulfilled.len(), 3);
        assert_eq!(report.errors.len(), 3);
        assert!(report.exhausted);
        let failure = report.errors.get(&bodies[4].0).unwrap();
        assert_eq!(failure.kind, FailureKind::Status(404));
        assert_eq!(failure.mirror, ORIGIN);
        assert_eq!(ctx.errors.count(ORIGIN), 3);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_a_failure() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let mut set = TaskSet::new();
        set.insert(FetchTask::new("p/a$deadbeef.json", "deadbeef"));
        let client = MockAsyncHttpClient::new().with_response("https://origin/p/a$deadbeef.json", b"{}".to_vec());
        let mut ctx = context(&[]);

        let report = FetchScheduler::new(&client)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut CountingProgress::default())
            .await;

        assert_eq!(report.errors["p/a$deadbeef.json"].kind, FailureKind::Checksum);
        assert!(!store.has("p/a$deadbeef.json"));

        let report = FetchScheduler::new(&client)
            .with_checksums(false)
            .run(&mut ctx, &store, set.stream(), Route::Origin, &mut CountingProgress::default())
            .await;
        assert_eq!(report.fulfilled, vec!["p/a$deadbeef.json".to_string()]);
    }

    #[tokio::test]
    async fn test_preferred_route_uses_mirror() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(3);
        let client = serve(MockAsyncHttpClient::new(), MIRROR, &bodies);
        let mut ctx = context(&[MIRROR]);

        let report = FetchScheduler::new(&client)
            .run(&mut ctx, &store, set.stream(), Route::Preferred, &mut CountingProgress::default())
            .await;

        assert_eq!(report.fulfilled.len(), 3);
        assert_eq!(client.requests_to(MIRROR), 3);
        assert_eq!(client.requests_to(ORIGIN), 0);
    }

    #[tokio::test]
    async fn test_mirror_at_limit_stops_receiving_within_batch() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(10);
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies)
            .failing_prefix(MIRROR, FetchError::Status(500));
        let mut ctx = context(&[MIRROR]).with_error_limit(3);

        let report = FetchScheduler::new(&client)
            .with_concurrency(1)
            .run(&mut ctx, &store, set.stream(), Route::Preferred, &mut CountingProgress::default())
            .await;

        assert_eq!(client.requests_to(MIRROR), 3);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.fulfilled.len(), 7);
    }

    #[tokio::test]
    async fn test_producer_error_drains_and_aborts() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = task_set(2);
        let client = serve(MockAsyncHttpClient::new(), ORIGIN, &bodies);
        let mut ctx = context(&[]);

        let mut items: Vec<MirrorResult<FetchTask>> = set.iter().cloned().map(Ok).collect();
        items.push(Err(MirrorError::malformed("p/shard.json", "bad")));
        items.push(Ok(FetchTask::new("p/never$00.json", "00")));

        let report = FetchScheduler::new(&client)
            .with_concurrency(4)
            .run(&mut ctx, &store, stream::iter(items), Route::Origin, &mut CountingProgress::default())
            .await;

        assert!(!report.exhausted);
        assert!(matches!(report.aborted, Some(MirrorError::MalformedIndex { .. })));
        assert_eq!(report.fulfilled.len(), 2);
        assert!(!client.requests().iter().any(|u| u.contains("never")));
    }
}
