//! Progress reporting for scheduler batches.

/// Receives batch progress. `progress` is called exactly once per task,
/// including skipped and failed ones.
pub trait ProgressSink {
    fn start(&mut self, total: Option<usize>);
    fn progress(&mut self);
    fn end(&mut self);
}

/// Sink that discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&mut self, _total: Option<usize>) {}
    fn progress(&mut self) {}
    fn end(&mut self) {}
}

/// Sink that counts calls, for tests and summaries.
#[derive(Debug, Default, Clone)]
pub struct CountingProgress {
    pub total: Option<usize>,
    pub ticks: usize,
    pub started: usize,
    pub ended: usize,
}

impl ProgressSink for CountingProgress {
    fn start(&mut self, total: Option<usize>) {
        self.total = total;
        self.started += 1;
    }

    fn progress(&mut self) {
        self.ticks += 1;
    }

    fn end(&mut self) {
        self.ended += 1;
    }
}
