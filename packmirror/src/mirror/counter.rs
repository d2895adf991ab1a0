//! Run-lifetime error counters per mirror.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    total: usize,
    last_reported: usize,
}

/// Cumulative error counts keyed by mirror host key.
///
/// Counts only grow; nothing resets them between shards or phases.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter {
    tallies: BTreeMap<String, Tally>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one error for `host_key`, returning the new total.
    pub fn record(&mut self, host_key: &str) -> usize {
        let tally = self.tallies.entry(host_key.to_string()).or_default();
        tally.total += 1;
        tally.total
    }

    pub fn count(&self, host_key: &str) -> usize {
        self.tallies.get(host_key).map_or(0, |t| t.total)
    }

    /// Total at the time of the last warning for `host_key`.
    pub fn last_reported(&self, host_key: &str) -> usize {
        self.tallies.get(host_key).map_or(0, |t| t.last_reported)
    }

    pub fn mark_reported(&mut self, host_key: &str) {
        if let Some(tally) = self.tallies.get_mut(host_key) {
            tally.last_reported = tally.total;
        }
    }

    /// Sum over all mirrors.
    pub fn total(&self) -> usize {
        self.tallies.values().map(|t| t.total).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.tallies.iter().map(|(k, t)| (k.as_str(), t.total))
    }
}
