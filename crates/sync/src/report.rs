//! Apply results and their aggregation.

use crate::{Change, SyncError};
use std::time::Duration;

/// Outcome of applying one change.
#[derive(Debug)]
pub struct ApplyResult {
    pub change: Change,
    pub error: Option<SyncError>,
}

impl ApplyResult {
    pub(crate) fn ok(change: Change) -> Self {
        Self {
            change,
            error: None,
        }
    }
}

/// Aggregated outcome of an apply run.
///
/// Invariants: `created + updated + deleted + unchanged + skipped + failed`
/// equals the change list length, `errors.len() == failed`, and dry runs
/// always report `api_calls == 0` while still tallying intent counters.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    pub api_calls: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    /// The run failed iff any change failed to apply.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.failed > 0
    }

    /// Observed request rate over the whole run, for the summary line.
    #[must_use]
    pub fn effective_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            {
                self.api_calls as f64 / secs
            }
        } else {
            0.0
        }
    }
}
