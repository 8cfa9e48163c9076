//! Fan-in stage: drains a pass's outcomes into the next pending set.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::outcome::Outcome;

/// Failed identifiers accumulated during one pass.
///
/// Guarded so several producers may record into one list.
#[derive(Debug)]
pub(crate) struct FailedList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> FailedList<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the collector observed during one pass.
#[derive(Debug)]
pub(crate) struct PassTally<T> {
    /// Items whose outcome carried an error, in arrival order.
    pub failed: Vec<T>,
    /// Outcomes received, successful or not.
    pub received: usize,
    /// Failed outcomes caused by the per-item deadline.
    pub timed_out: usize,
    /// The run was cancelled before the outcome stream closed.
    pub interrupted: bool,
}

/// Read outcomes until the stream closes or `cancel` fires.
pub(crate) async fn collect<T>(
    outcomes: &mut mpsc::Receiver<Outcome<T>>,
    cancel: &CancellationToken,
) -> PassTally<T> {
    let failed = FailedList::new();
    let mut received = 0;
    let mut timed_out = 0;
    let mut interrupted = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            next = outcomes.recv() => {
                let Some(outcome) = next else {
                    break;
                };
                received += 1;
                let (item, error) = outcome.into_parts();
                if let Some(err) = error {
                    if err.is_timeout() {
                        timed_out += 1;
                    }
                    failed.record(item);
                }
            }
        }
    }

    PassTally {
        failed: failed.into_inner(),
        received,
        timed_out,
        interrupted,
    }
}
