//! Single-pass recovery of failed fetches against the origin.

use super::progress::ProgressSink;
use super::scheduler::FetchScheduler;
use super::task::ErrorMap;
use crate::http::AsyncHttpClient;
use crate::index::TaskSet;
use crate::mirror::{Route, SyncContext};
use crate::store::MetadataStore;

/// Result of a fallback pass.
#[derive(Debug, Default)]
pub struct FallbackReport {
    /// URIs re-issued against the origin.
    pub retried: Vec<String>,
    /// URIs the origin served successfully.
    pub recovered: Vec<String>,
    /// Failures that survived the retry. Reported, not retried again.
    pub final_errors: ErrorMap,
}

impl FallbackReport {
    pub fn is_noop(&self) -> bool {
        self.retried.is_empty()
    }
}

/// Retry exactly the failed URIs of `tasks` once, on the origin.
///
/// An empty error map makes no requests.
pub async fn run_fallback<C, P>(
    scheduler: &FetchScheduler<'_, C>,
    ctx: &mut SyncContext,
    store: &MetadataStore,
    tasks: &TaskSet,
    errors: &ErrorMap,
    progress: &mut P,
) -> FallbackReport
where
    C: AsyncHttpClient,
    P: ProgressSink + ?Sized,
{
    if errors.is_empty() {
        return FallbackReport::default();
    }

    let retry = tasks.restrict(errors.keys().map(String::as_str));
    let retried: Vec<String> = retry.iter().map(|t| t.uri.clone()).collect();

    tracing::debug!(count = retried.len(), "Retrying failed fetches on origin");
    let report = scheduler
        .run(ctx, store, retry.stream(), Route::Origin, progress)
        .await;

    FallbackReport {
        retried,
        recovered: report.fulfilled,
        final_errors: report.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sha256_hex;
    use crate::fetch::{CountingProgress, FailureKind, FetchFailure, FetchTask};
    use crate::http::tests::MockAsyncHttpClient;
    use crate::http::FetchError;
    use crate::mirror::MirrorSet;
    use tempfile::TempDir;

    fn failure() -> FetchFailure {
        FetchFailure::new(FailureKind::Status(502), "https://m1", "HTTP 502")
    }

    fn fixture() -> (TaskSet, Vec<(String, Vec<u8>)>) {
        let mut set = TaskSet::new();
        let mut bodies = Vec::new();
        for name in ["a", "b", "c"] {
            let body = format!("{{\"name\":\"{}\"}}", name).into_bytes();
            let hash = sha256_hex(&body);
            let uri = format!("p/{}${}.json", name, hash);
            set.insert(FetchTask::new(uri.clone(), hash));
            bodies.push((uri, body));
        }
        (set, bodies)
    }

    #[tokio::test]
    async fn test_empty_error_map_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, _) = fixture();
        let client = MockAsyncHttpClient::new();
        let scheduler = FetchScheduler::new(&client);
        let mut ctx = SyncContext::new(MirrorSet::new::<&str>("https://origin", &[]).unwrap());
        let mut progress = CountingProgress::default();

        let report = run_fallback(&scheduler, &mut ctx, &store, &set, &ErrorMap::new(), &mut progress).await;

        assert!(report.is_noop());
        assert!(client.requests().is_empty());
        assert_eq!(progress.started, 0);
    }

    #[tokio::test]
    async fn test_retries_exactly_failed_uris_on_origin() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = fixture();
        let mut client = MockAsyncHttpClient::new().failing_prefix("https://m1", FetchError::Timeout);
        for (uri, body) in &bodies {
            client = client.with_response(format!("https://origin/{}", uri), body.clone());
        }
        let scheduler = FetchScheduler::new(&client);
        let mut ctx = SyncContext::new(MirrorSet::new("https://origin", &["https://m1"]).unwrap());

        let mut errors = ErrorMap::new();
        errors.insert(bodies[0].0.clone(), failure());
        errors.insert(bodies[2].0.clone(), failure());

        let report = run_fallback(
            &scheduler,
            &mut ctx,
            &store,
            &set,
            &errors,
            &mut CountingProgress::default(),
        )
        .await;

        let mut retried = report.retried.clone();
        retried.sort();
        let mut expected: Vec<String> = errors.keys().cloned().collect();
        expected.sort();
        assert_eq!(retried, expected);
        assert_eq!(report.recovered.len(), 2);
        assert!(report.final_errors.is_empty());
        assert_eq!(client.requests_to("https://m1"), 0);
        assert_eq!(client.requests_to("https://origin"), 2);
        assert_eq!(store.read(&bodies[0].0).unwrap(), bodies[0].1);
    }

    #[tokio::test]
    async fn test_survivors_are_final_failures() {
        let temp = TempDir::new().unwrap();
        let store = MetadataStore::new(temp.path());
        let (set, bodies) = fixture();
        let client = MockAsyncHttpClient::new();
        let scheduler = FetchScheduler::new(&client);
        let mut ctx = SyncContext::new(MirrorSet::new::<&str>("https://origin", &[]).unwrap());

        let mut errors = ErrorMap::new();
        errors.insert(bodies[1].0.clone(), failure());

        let report = run_fallback(
            &scheduler,
            &mut ctx,
            &store,
            &set,
            &errors,
            &mut CountingProgress::default(),
        )
        .await;

        assert_eq!(report.retried, vec![bodies[1].0.clone()]);
        assert_eq!(client.requests().len(), 1);
        assert_eq!(
            report.final_errors[&bodies[1].0].kind,
            FailureKind::Status(404)
        );
    }
}
