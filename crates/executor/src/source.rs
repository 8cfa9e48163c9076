//! Pass input stage: streams the pending set to the worker pool.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::id::ItemId;

/// Handle to the task feeding one pass's pending identifiers.
///
/// On cancellation the task stops mid-batch and closes the stream. Identifiers
/// not yet emitted are dropped: they produce no outcome, so they are neither
/// reported as failed nor retried. Cancellation abandons the whole run, so the
/// caller reports those items through the dropped count of the pass.
pub(crate) struct ItemSource<T> {
    rx: mpsc::Receiver<T>,
    handle: JoinHandle<usize>,
}

impl<T: ItemId> ItemSource<T> {
    /// Spawn the feeder. The queue holds at most `buffer` identifiers, so the
    /// feeder waits whenever every worker is busy.
    pub fn spawn(pending: Vec<T>, buffer: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(Self::run(pending, tx, cancel));
        Self { rx, handle }
    }

    async fn run(pending: Vec<T>, tx: mpsc::Sender<T>, cancel: CancellationToken) -> usize {
        let total = pending.len();
        let mut emitted = 0;

        for item in pending {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(emitted, dropped = total - emitted, "[source] cancelled, closing stream");
                    return emitted;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        debug!(emitted, "[source] consumer closed");
                        return emitted;
                    }
                    emitted += 1;
                }
            }
        }

        emitted
    }

    /// Split into the stream and a handle resolving to the number of emitted items.
    pub fn into_parts(self) -> (mpsc::Receiver<T>, JoinHandle<usize>) {
        (self.rx, self.handle)
    }
}
