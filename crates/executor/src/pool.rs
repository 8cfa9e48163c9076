//! Fixed-size worker pool for one pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::id::ItemId;
use crate::invoker::invoke;
use crate::outcome::Outcome;
use crate::work::Work;

/// Workers pulling from a shared item stream and emitting one outcome per item.
///
/// Every worker owns a sender of the outcome stream, so the stream closes
/// only once the last worker has exited.
pub(crate) struct WorkerPool<T> {
    outcomes: mpsc::Receiver<Outcome<T>>,
    workers: JoinSet<()>,
}

impl<T: ItemId> WorkerPool<T> {
    /// Start exactly `size` workers over `items`.
    pub fn spawn<W>(
        items: mpsc::Receiver<T>,
        work: Arc<W>,
        size: usize,
        outcome_buffer: usize,
        per_item_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self
    where
        W: Work<T>,
    {
        let (tx, outcomes) = mpsc::channel(outcome_buffer.max(1));
        let items = Arc::new(Mutex::new(items));
        let mut workers = JoinSet::new();

        for worker_id in 0..size.max(1) {
            workers.spawn(worker(
                worker_id,
                Arc::clone(&items),
                Arc::clone(&work),
                tx.clone(),
                per_item_timeout,
                cancel.clone(),
            ));
        }

        Self { outcomes, workers }
    }

    pub fn outcomes(&mut self) -> &mut mpsc::Receiver<Outcome<T>> {
        &mut self.outcomes
    }

    /// Close the outcome stream and wait for every worker to exit.
    pub async fn join(mut self) {
        self.outcomes.close();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "[pool] worker task failed");
            }
        }
    }
}

async fn worker<T, W>(
    worker_id: usize,
    items: Arc<Mutex<mpsc::Receiver<T>>>,
    work: Arc<W>,
    outcomes: mpsc::Sender<Outcome<T>>,
    per_item_timeout: Duration,
    cancel: CancellationToken,
) where
    T: ItemId,
    W: Work<T>,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = async { items.lock().await.recv().await } => item,
        };
        let Some(item) = next else {
            break;
        };

        let outcome = invoke(&work, item, &cancel, per_item_timeout).await;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = outcomes.send(outcome) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    debug!(worker_id, "[pool] worker exited");
}
