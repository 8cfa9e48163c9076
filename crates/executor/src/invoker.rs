//! Single invocation of the work function under a per-item deadline.
//!
//! The work runs in its own task and is raced against the item deadline and
//! the run's cancellation. Whichever finishes first decides the outcome, and
//! the invoker returns immediately.
//!
//! ## Abandoned invocations
//!
//! Cancellation is cooperative. When the deadline wins, the item's token is
//! cancelled and the task is aborted, but an invocation that never yields (or
//! a [`crate::blocking`] call already on its thread) keeps running in the
//! background until it returns on its own. Its result is discarded. Such an
//! invocation no longer counts against the pool size, so a work function that
//! routinely ignores its deadline can run alongside newer invocations.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::id::ItemId;
use crate::outcome::{ItemError, Outcome};
use crate::work::Work;

/// Run `work` for one item and turn whatever happens into exactly one outcome.
pub(crate) async fn invoke<T, W>(
    work: &Arc<W>,
    item: T,
    run_cancel: &CancellationToken,
    timeout: Duration,
) -> Outcome<T>
where
    T: ItemId,
    W: Work<T>,
{
    let item_cancel = run_cancel.child_token();

    let mut handle = tokio::spawn({
        let work = Arc::clone(work);
        let item = item.clone();
        let item_cancel = item_cancel.clone();
        async move { work.execute(item, item_cancel).await }
    });

    let error = tokio::select! {
        joined = &mut handle => match joined {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(ItemError::Failed(err)),
            Err(err) => Some(join_error(err)),
        },
        _ = tokio::time::sleep(timeout) => Some(ItemError::TimedOut(timeout)),
        _ = run_cancel.cancelled() => Some(ItemError::Cancelled),
    };

    match error {
        None => Outcome::success(item),
        Some(err) => {
            if matches!(err, ItemError::TimedOut(_) | ItemError::Cancelled) {
                item_cancel.cancel();
                handle.abort();
            }
            debug!(item = ?item, error = %err, "item invocation failed");
            Outcome::failure(item, err)
        }
    }
}

fn join_error(err: JoinError) -> ItemError {
    if err.is_panic() {
        ItemError::Panicked(panic_message(err.into_panic()))
    } else {
        ItemError::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
