//! `batchpass-executor` — bounded-concurrency batch execution with pass-level retries.
//!
//! ## Design
//!
//! A run streams its items through a three-stage pipeline:
//!
//! - `source`: feeds the pending set into a bounded queue
//! - `pool`: a fixed number of workers invoking the work function per item
//! - `collector`: gathers failed items into the next pending set
//!
//! The orchestrator repeats that pipeline over the failed subset until a pass
//! has no failures, the retry budget runs out, or the overall deadline
//! elapses. A single [`CancellationToken`] per run reaches every stage.
//!
//! ```ignore
//! let executor = BatchExecutor::new(ExecutorConfig::new().with_max_concurrency(8));
//! let report = executor
//!     .run(ids, |id: u64, _cancel: CancellationToken| async move { check(id).await })
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod work;

mod collector;
mod invoker;
mod pool;
mod source;

pub use config::{
    DEFAULT_MAX_RETRIES, DEFAULT_OVERALL_TIMEOUT, DEFAULT_PER_ITEM_TIMEOUT, DEFAULT_RETRY_DELAY,
    ExecutorConfig, SOURCE_BUFFER_FACTOR,
};
pub use error::RunError;
pub use id::{ItemId, RunId};
pub use orchestrator::BatchExecutor;
pub use outcome::{ItemError, Outcome};
pub use report::{PassSummary, RunReport};
pub use tokio_util::sync::CancellationToken;
pub use work::{Blocking, Work, blocking};
