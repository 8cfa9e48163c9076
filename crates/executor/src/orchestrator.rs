//! Retry orchestration: repeated passes over a shrinking pending set.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Running(1) -> Running(2) -> ... -> Succeeded
//!                  \             \
//!                   +-> Backoff --+-> RetriesExhausted | DeadlineExceeded | Cancelled
//! ```
//!
//! - Pass 1 runs every item; pass N runs only the items that failed in pass N-1.
//! - A pass with no failures ends the run successfully.
//! - After pass `max_retries + 1` the run gives up with the remaining failures.
//! - One deadline covers the whole run. When it elapses, the run's token is
//!   cancelled, the current pass winds down and the run ends with whatever
//!   failures were observed so far.
//!
//! Each pass builds its own source, pool and collector and joins all of them
//! before the next state is entered. Only the pending set moves between passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::collector::{PassTally, collect};
use crate::config::ExecutorConfig;
use crate::error::RunError;
use crate::id::{ItemId, RunId};
use crate::pool::WorkerPool;
use crate::report::{PassSummary, RunReport};
use crate::source::ItemSource;
use crate::work::Work;

/// Run state. Every transition happens in [`BatchExecutor::run_with_cancel`].
#[derive(Debug)]
enum RunState<T> {
    Idle { items: Vec<T> },
    Running { pass: u32, pending: Vec<T> },
    Backoff { next_pass: u32, pending: Vec<T> },
    Succeeded,
    RetriesExhausted { failed: Vec<T> },
    DeadlineExceeded { failed: Vec<T> },
    Cancelled { failed: Vec<T> },
}

/// Bounded-concurrency batch executor with pass-level retries.
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `work` over `items` until every item has succeeded once.
    ///
    /// Returns the run history on success. Fails when items are still failing
    /// after the retry budget or the overall deadline is used up.
    pub async fn run<T, W>(
        &self,
        items: impl IntoIterator<Item = T>,
        work: W,
    ) -> Result<RunReport, RunError<T>>
    where
        T: ItemId,
        W: Work<T>,
    {
        self.run_with_cancel(items, work, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), additionally stopped when `parent` is cancelled.
    pub async fn run_with_cancel<T, W>(
        &self,
        items: impl IntoIterator<Item = T>,
        work: W,
        parent: CancellationToken,
    ) -> Result<RunReport, RunError<T>>
    where
        T: ItemId,
        W: Work<T>,
    {
        let run_id = RunId::new();
        let items: Vec<T> = items.into_iter().collect();
        let span = info_span!("batch_run", %run_id);

        self.drive(run_id, items, Arc::new(work), parent)
            .instrument(span)
            .await
    }

    /// Synchronous entry point for callers outside an async runtime.
    ///
    /// Builds a dedicated multi-threaded runtime sized to `max_concurrency`.
    /// The runtime is shut down without waiting for abandoned invocations.
    /// Must not be called from within a tokio runtime.
    pub fn run_blocking<T, W>(
        &self,
        items: impl IntoIterator<Item = T>,
        work: W,
    ) -> Result<RunReport, RunError<T>>
    where
        T: ItemId,
        W: Work<T>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrency())
            .thread_name("batchpass-worker")
            .enable_all()
            .build()?;

        let result = runtime.block_on(self.run(items, work));
        runtime.shutdown_background();
        result
    }

    async fn drive<T, W>(
        &self,
        run_id: RunId,
        items: Vec<T>,
        work: Arc<W>,
        parent: CancellationToken,
    ) -> Result<RunReport, RunError<T>>
    where
        T: ItemId,
        W: Work<T>,
    {
        let cancel = parent.child_token();
        // Releases cooperative work abandoned by timed-out invocations.
        let _release = cancel.clone().drop_guard();
        let deadline = deadline_after(self.config.overall_timeout());
        let mut report = RunReport::start(run_id);

        info!(
            items = items.len(),
            max_concurrency = self.config.max_concurrency(),
            max_retries = self.config.max_retries(),
            "batch run started"
        );

        let mut state = RunState::Idle { items };
        loop {
            state = match state {
                RunState::Idle { items } => RunState::Running {
                    pass: 1,
                    pending: items,
                },

                RunState::Running { pass, pending } => {
                    let (summary, tally) =
                        self.run_pass(pass, pending, &work, &cancel, deadline).await;
                    let interrupted = tally.interrupted || summary.dropped > 0;
                    report.record_pass(summary);

                    if interrupted {
                        interrupted_state(&parent, tally.failed)
                    } else if tally.failed.is_empty() {
                        RunState::Succeeded
                    } else if pass > self.config.max_retries() {
                        RunState::RetriesExhausted {
                            failed: tally.failed,
                        }
                    } else {
                        info!(
                            failed = tally.failed.len(),
                            next_attempt = pass + 1,
                            "retrying failed items"
                        );
                        RunState::Backoff {
                            next_pass: pass + 1,
                            pending: tally.failed,
                        }
                    }
                }

                RunState::Backoff { next_pass, pending } => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => interrupted_state(&parent, pending),
                        _ = tokio::time::sleep_until(deadline) => {
                            cancel.cancel();
                            interrupted_state(&parent, pending)
                        }
                        _ = tokio::time::sleep(self.config.retry_delay()) => RunState::Running {
                            pass: next_pass,
                            pending,
                        },
                    }
                }

                RunState::Succeeded => {
                    let report = report.finish();
                    info!(attempts = report.attempts, "batch run succeeded");
                    return Ok(report);
                }

                RunState::RetriesExhausted { failed } => {
                    let report = report.finish();
                    warn!(
                        failed = failed.len(),
                        attempts = report.attempts,
                        "batch run exhausted its retries"
                    );
                    return Err(RunError::RetriesExhausted {
                        failed,
                        attempts: report.attempts,
                        report,
                    });
                }

                RunState::DeadlineExceeded { failed } => {
                    let report = report.finish();
                    warn!(
                        failed = failed.len(),
                        attempts = report.attempts,
                        timeout = ?self.config.overall_timeout(),
                        "batch run exceeded its deadline"
                    );
                    return Err(RunError::DeadlineExceeded {
                        failed,
                        attempts: report.attempts,
                        timeout: self.config.overall_timeout(),
                        report,
                    });
                }

                RunState::Cancelled { failed } => {
                    let report = report.finish();
                    warn!(
                        failed = failed.len(),
                        attempts = report.attempts,
                        "batch run cancelled"
                    );
                    return Err(RunError::Cancelled {
                        failed,
                        attempts: report.attempts,
                        report,
                    });
                }
            };
        }
    }

    /// One fan-out/fan-in pass. Returns after source, workers and collector
    /// have all finished.
    async fn run_pass<T, W>(
        &self,
        pass: u32,
        pending: Vec<T>,
        work: &Arc<W>,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> (PassSummary, PassTally<T>)
    where
        T: ItemId,
        W: Work<T>,
    {
        let attempted = pending.len();
        let started = Instant::now();
        debug!(pass, pending = attempted, "pass started");

        let (items, source) =
            ItemSource::spawn(pending, self.config.source_buffer(), cancel.clone()).into_parts();
        let mut pool = WorkerPool::spawn(
            items,
            Arc::clone(work),
            self.config.max_concurrency(),
            self.config.outcome_buffer(),
            self.config.per_item_timeout(),
            cancel.clone(),
        );

        let tally = {
            let collecting = collect(pool.outcomes(), cancel);
            tokio::pin!(collecting);
            tokio::select! {
                tally = &mut collecting => tally,
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.cancel();
                    collecting.await
                }
            }
        };

        pool.join().await;
        let emitted = match source.await {
            Ok(emitted) => emitted,
            Err(err) => {
                error!(pass, error = %err, "[source] feeder task failed");
                tally.received
            }
        };

        let summary = PassSummary {
            pass,
            attempted,
            failed: tally.failed.len(),
            timed_out: tally.timed_out,
            dropped: attempted.saturating_sub(tally.received),
            duration: started.elapsed(),
        };
        debug!(
            pass,
            emitted,
            failed = summary.failed,
            timed_out = summary.timed_out,
            dropped = summary.dropped,
            "pass finished"
        );

        (summary, tally)
    }
}

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// Terminal state for a run whose token fired: the caller's cancellation if
/// the parent token fired, otherwise the overall deadline.
fn interrupted_state<T>(parent: &CancellationToken, failed: Vec<T>) -> RunState<T> {
    if parent.is_cancelled() {
        RunState::Cancelled { failed }
    } else {
        RunState::DeadlineExceeded { failed }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig::new()
            .with_max_concurrency(4)
            .with_retry_delay(Duration::ZERO)
            .with_overall_timeout(Duration::from_secs(10))
            .with_per_item_timeout(Duration::from_secs(2))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_success_finishes_in_one_pass() {
        let executor = BatchExecutor::new(fast_config());
        let work = |_: u32, _: CancellationToken| async { anyhow::Ok(()) };

        let report = executor.run(0..20u32, work).await.unwrap();

        assert_eq!(report.attempts, 1);
        assert!(report.is_clean());
        assert_eq!(report.passes[0].attempted, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn retries_only_failed_items() {
        let calls: Arc<Mutex<HashMap<u32, u32>>> = Arc::default();
        let work = {
            let calls = calls.clone();
            move |item: u32, _: CancellationToken| {
                let calls = calls.clone();
                async move {
                    let n = {
                        let mut calls = calls.lock().unwrap();
                        let n = calls.entry(item).or_default();
                        *n += 1;
                        *n
                    };
                    if item % 2 == 0 && n < 2 {
                        anyhow::bail!("item {item} not ready");
                    }
                    Ok(())
                }
            }
        };

        let report = BatchExecutor::new(fast_config())
            .run(0..10u32, work)
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.passes[1].attempted, 5);
        let calls = calls.lock().unwrap();
        assert!((0..10).filter(|i| i % 2 == 1).all(|i| calls[&i] == 1));
        assert!((0..10).filter(|i| i % 2 == 0).all(|i| calls[&i] == 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unbounded_overall_timeout_is_accepted() {
        let config = fast_config().with_overall_timeout(Duration::MAX);
        let work = |_: u32, _: CancellationToken| async { anyhow::Ok(()) };

        let report = BatchExecutor::new(config)
            .run(vec![1u32, 2], work)
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert!(deadline_after(Duration::MAX) > Instant::now());
    }

    #[tokio::test]
    async fn empty_input_succeeds_immediately() {
        let work = |_: u32, _: CancellationToken| async { anyhow::Ok(()) };

        let report = BatchExecutor::new(fast_config())
            .run(Vec::new(), work)
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.invocations(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parent_cancellation_is_reported_as_cancelled() {
        let parent = CancellationToken::new();
        let work = |_: u32, cancel: CancellationToken| async move {
            cancel.cancelled().await;
            anyhow::Ok(())
        };

        let trigger = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = BatchExecutor::new(fast_config())
            .run_with_cancel(0..8u32, work, parent)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Cancelled { .. }));
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_during_backoff_ends_run() {
        let config = fast_config()
            .with_max_retries(5)
            .with_retry_delay(Duration::from_secs(30))
            .with_overall_timeout(Duration::from_millis(200));
        let work = |item: u32, _: CancellationToken| async move {
            Err::<(), _>(anyhow::anyhow!("item {item} always fails"))
        };

        let started = std::time::Instant::now();
        let err = BatchExecutor::new(config)
            .run(vec![1u32, 2], work)
            .await
            .unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert_eq!(err.attempts(), 1);
        let mut failed = err.failed_items().to_vec();
        failed.sort_unstable();
        assert_eq!(failed, vec![1, 2]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
