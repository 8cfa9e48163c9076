//! Run history returned to the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::id::RunId;

/// Record of one pass over the pending set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// 1-indexed pass number (equals the attempt number).
    pub pass: u32,
    /// Size of the pending set handed to this pass.
    pub attempted: usize,
    /// Items whose outcome carried an error.
    pub failed: usize,
    /// Of `failed`, how many hit the per-item deadline.
    pub timed_out: usize,
    /// Items that produced no outcome because the run was cancelled mid-pass.
    pub dropped: usize,
    pub duration: Duration,
}

/// History of a run, present on success and inside every [`crate::RunError`]
/// that ends a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passes: Vec<PassSummary>,
}

impl RunReport {
    pub(crate) fn start(run_id: RunId) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            attempts: 0,
            started_at: now,
            finished_at: now,
            passes: Vec::new(),
        }
    }

    pub(crate) fn record_pass(&mut self, summary: PassSummary) {
        self.attempts = summary.pass;
        self.passes.push(summary);
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// True when the first pass already succeeded for every item.
    pub fn is_clean(&self) -> bool {
        self.attempts == 1 && self.passes.iter().all(|p| p.failed == 0 && p.dropped == 0)
    }

    /// Total invocations across all passes.
    pub fn invocations(&self) -> usize {
        self.passes.iter().map(|p| p.attempted - p.dropped).sum()
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
