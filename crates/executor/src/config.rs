//! Run parameters for the batch executor.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use serde::Serialize;

/// Default retry budget (retries after the first pass).
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default deadline for a whole run, shared by every pass.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Default deadline for a single invocation of the work function.
pub const DEFAULT_PER_ITEM_TIMEOUT: Duration = Duration::from_secs(30);
/// Default pause between two consecutive passes.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// The item queue holds this many identifiers per worker.
pub const SOURCE_BUFFER_FACTOR: usize = 10;

/// Executor configuration.
///
/// Built from defaults with `with_*` overrides. A zero override is ignored and
/// the field keeps its default, so a config can never describe an empty pool,
/// an instant deadline or a zero retry budget by accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutorConfig {
    max_concurrency: usize,
    max_retries: u32,
    overall_timeout: Duration,
    per_item_timeout: Duration,
    retry_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            max_retries: DEFAULT_MAX_RETRIES,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            per_item_timeout: DEFAULT_PER_ITEM_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers per pass. Zero keeps the default (host parallelism).
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        if n > 0 {
            self.max_concurrency = n;
        }
        self
    }

    /// Retries allowed after the first pass. Zero keeps the default.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        if n > 0 {
            self.max_retries = n;
        }
        self
    }

    /// Deadline for the whole run. Zero keeps the default.
    pub fn with_overall_timeout(mut self, d: Duration) -> Self {
        if !d.is_zero() {
            self.overall_timeout = d;
        }
        self
    }

    /// Deadline for one invocation of the work function. Zero keeps the default.
    pub fn with_per_item_timeout(mut self, d: Duration) -> Self {
        if !d.is_zero() {
            self.per_item_timeout = d;
        }
        self
    }

    /// Pause between passes. Zero is accepted and disables the pause.
    pub fn with_retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = d;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    pub fn per_item_timeout(&self) -> Duration {
        self.per_item_timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Capacity of the item queue feeding the worker pool.
    pub fn source_buffer(&self) -> usize {
        self.max_concurrency * SOURCE_BUFFER_FACTOR
    }

    /// Capacity of the outcome queue draining the worker pool.
    pub fn outcome_buffer(&self) -> usize {
        self.max_concurrency
    }
}

fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
