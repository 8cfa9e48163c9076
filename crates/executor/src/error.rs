//! Run-level failures.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::report::RunReport;

/// A run that ended with items still failing.
///
/// Item-level errors never surface here on their own; they are retried until
/// the budget or the deadline runs out, and only then reported together.
#[derive(Debug, Error)]
pub enum RunError<T: fmt::Debug> {
    /// Every retry was used and some items never succeeded.
    #[error("run {} gave up after {attempts} attempt(s): {} item(s) still failing", .report.run_id, .failed.len())]
    RetriesExhausted {
        failed: Vec<T>,
        attempts: u32,
        report: RunReport,
    },

    /// The overall deadline elapsed before every item succeeded.
    #[error("run {} exceeded its {timeout:?} deadline after {attempts} attempt(s): {} item(s) failing", .report.run_id, .failed.len())]
    DeadlineExceeded {
        failed: Vec<T>,
        attempts: u32,
        timeout: Duration,
        report: RunReport,
    },

    /// The caller's cancellation token fired.
    #[error("run {} cancelled after {attempts} attempt(s): {} item(s) failing", .report.run_id, .failed.len())]
    Cancelled {
        failed: Vec<T>,
        attempts: u32,
        report: RunReport,
    },

    /// The runtime backing a blocking run could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl<T: fmt::Debug> RunError<T> {
    /// Items that had not succeeded when the run ended.
    pub fn failed_items(&self) -> &[T] {
        match self {
            RunError::RetriesExhausted { failed, .. }
            | RunError::DeadlineExceeded { failed, .. }
            | RunError::Cancelled { failed, .. } => failed,
            RunError::Runtime(_) => &[],
        }
    }

    /// Passes started before the run ended.
    pub fn attempts(&self) -> u32 {
        match self {
            RunError::RetriesExhausted { attempts, .. }
            | RunError::DeadlineExceeded { attempts, .. }
            | RunError::Cancelled { attempts, .. } => *attempts,
            RunError::Runtime(_) => 0,
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunError::RetriesExhausted { report, .. }
            | RunError::DeadlineExceeded { report, .. }
            | RunError::Cancelled { report, .. } => Some(report),
            RunError::Runtime(_) => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RunError::DeadlineExceeded { .. })
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, RunError::RetriesExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RunId;
    use crate::report::RunReport;

    #[test]
    fn message_names_attempts_and_failures() {
        let report = RunReport::start(RunId::new());
        let run_id = report.run_id;
        let err = RunError::RetriesExhausted {
            failed: vec![1, 2],
            attempts: 3,
            report,
        };

        assert_eq!(
            err.to_string(),
            format!("run {run_id} gave up after 3 attempt(s): 2 item(s) still failing")
        );
        assert_eq!(err.failed_items(), &[1, 2]);
        assert_eq!(err.attempts(), 3);
        assert!(err.is_retries_exhausted());
    }

    #[test]
    fn runtime_error_has_no_report() {
        let err: RunError<u32> = std::io::Error::other("no threads").into();

        assert!(err.report().is_none());
        assert!(err.failed_items().is_empty());
        assert_eq!(err.attempts(), 0);
    }
}
