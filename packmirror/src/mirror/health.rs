//! Mirror health tracking.
//!
//! After every batch the tracker walks the secondary mirrors and compares
//! their cumulative error counts against the run's limit.
//!
//! ```text
//! Active --[count >= limit]--> Disabled (for the rest of the run)
//! Active --[1 < count < limit, count changed, verbose]--> Active + Warning
//! ```
//!
//! There is no recovery path: counts never decay during a run, so a disabled
//! mirror stays disabled until the process exits.

use std::fmt;

use super::context::SyncContext;

/// A health event for one mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorNotice {
    /// The mirror reached the error limit and was removed from rotation.
    Disabled { mirror: String, errors: usize },
    /// The mirror has accumulated errors but is still in rotation.
    Warning { mirror: String, errors: usize },
}

impl MirrorNotice {
    pub fn mirror(&self) -> &str {
        match self {
            MirrorNotice::Disabled { mirror, .. } | MirrorNotice::Warning { mirror, .. } => mirror,
        }
    }
}

impl fmt::Display for MirrorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorNotice::Disabled { mirror, errors } => {
                write!(f, "mirror {} disabled after {} errors", mirror, errors)
            }
            MirrorNotice::Warning { mirror, errors } => {
                write!(f, "mirror {} has {} errors", mirror, errors)
            }
        }
    }
}

/// Applies the error limit to the mirror set after each batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthTracker {
    verbose: bool,
}

impl HealthTracker {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Inspect every active mirror, disabling those at or above the limit.
    pub fn observe(&self, ctx: &mut SyncContext) -> Vec<MirrorNotice> {
        let active: Vec<(String, String)> = ctx
            .mirrors
            .active()
            .map(|m| (m.host_key().to_string(), m.base_uri().to_string()))
            .collect();

        let mut notices = Vec::new();
        for (host_key, base_uri) in active {
            let errors = ctx.errors.count(&host_key);

            if errors >= ctx.error_limit {
                if ctx.mirrors.disable(&host_key) {
                    tracing::warn!(
                        mirror = %base_uri,
                        errors,
                        limit = ctx.error_limit,
                        "Mirror disabled"
                    );
                    notices.push(MirrorNotice::Disabled {
                        mirror: base_uri,
                        errors,
                    });
                }
            } else if self.verbose && errors > 1 && errors != ctx.errors.last_reported(&host_key) {
                ctx.errors.mark_reported(&host_key);
                tracing::info!(mirror = %base_uri, errors, "Mirror errors");
                notices.push(MirrorNotice::Warning {
                    mirror: base_uri,
                    errors,
                });
            }
        }

        notices
    }
}
