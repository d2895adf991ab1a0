//! Run-scoped mirror state and request routing.

use super::counter::ErrorCounter;
use super::endpoint::MirrorSet;
use crate::config::MirrorConfig;
use crate::error::MirrorResult;

/// Default cumulative error count at which a mirror is disabled.
pub const DEFAULT_ERROR_LIMIT: usize = 100;

/// Where a batch's requests go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Secondary mirrors first, the origin when none is usable.
    Preferred,
    /// The origin only.
    Origin,
}

/// The endpoint chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub base_uri: String,
    pub host_key: String,
}

impl Target {
    pub fn url_for(&self, uri: &str) -> String {
        format!("{}/{}", self.base_uri, uri.trim_start_matches('/'))
    }
}

/// Mirror set and error counters shared by every phase of one run.
///
/// Owned by the orchestrator and lent out by `&mut`; nothing in here is
/// shared across threads.
#[derive(Debug)]
pub struct SyncContext {
    pub mirrors: MirrorSet,
    pub errors: ErrorCounter,
    pub error_limit: usize,
    cursor: usize,
}

impl SyncContext {
    pub fn new(mirrors: MirrorSet) -> Self {
        Self {
            mirrors,
            errors: ErrorCounter::new(),
            error_limit: DEFAULT_ERROR_LIMIT,
            cursor: 0,
        }
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit.max(1);
        self
    }

    /// Build the context from configuration, validating every endpoint.
    pub fn from_config(config: &MirrorConfig) -> MirrorResult<Self> {
        let mirrors = MirrorSet::new(&config.origin_url, &config.mirrors)?;
        Ok(Self::new(mirrors).with_error_limit(config.error_limit))
    }

    /// Whether a mirror may still receive requests.
    ///
    /// A mirror stops being eligible as soon as its count reaches the limit,
    /// even before the health tracker formally disables it.
    pub fn is_usable(&self, host_key: &str) -> bool {
        self.errors.count(host_key) < self.error_limit
    }

    /// Pick the endpoint for the next request.
    pub fn select(&mut self, route: Route) -> Target {
        if route == Route::Preferred {
            let candidates: Vec<_> = self
                .mirrors
                .active()
                .filter(|m| self.is_usable(m.host_key()))
                .collect();

            if !candidates.is_empty() {
                let chosen = candidates[self.cursor % candidates.len()];
                self.cursor = self.cursor.wrapping_add(1);
                return Target {
                    base_uri: chosen.base_uri().to_string(),
                    host_key: chosen.host_key().to_string(),
                };
            }
        }

        let origin = self.mirrors.origin();
        Target {
            base_uri: origin.base_uri().to_string(),
            host_key: origin.host_key().to_string(),
        }
    }
}
