//! The caller-supplied per-item function.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::id::ItemId;

/// Work executed once per item per pass.
///
/// Implementations are called concurrently from every worker of a pass and
/// must tolerate that. The token fires when the item's own deadline elapses
/// or the run is cancelled; honouring it is optional but lets abandoned
/// invocations stop early.
#[async_trait]
pub trait Work<T: ItemId>: Send + Sync + 'static {
    async fn execute(&self, item: T, cancel: CancellationToken) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F, Fut> Work<T> for F
where
    T: ItemId,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn execute(&self, item: T, cancel: CancellationToken) -> anyhow::Result<()> {
        self(item, cancel).await
    }
}

/// Synchronous work run on the blocking thread pool. See [`blocking`].
#[derive(Debug)]
pub struct Blocking<F> {
    func: Arc<F>,
}

/// Adapt a synchronous function into [`Work`].
///
/// Each call runs on tokio's blocking pool, so a slow function occupies a
/// dedicated thread rather than a runtime worker. The cancellation token is
/// not visible to the function; a timed-out call keeps its thread until it
/// returns on its own.
pub fn blocking<T, F>(func: F) -> Blocking<F>
where
    T: ItemId,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Blocking {
        func: Arc::new(func),
    }
}

#[async_trait]
impl<T, F> Work<T> for Blocking<F>
where
    T: ItemId,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn execute(&self, item: T, _cancel: CancellationToken) -> anyhow::Result<()> {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func(&item)).await {
            Ok(result) => result,
            // Re-raise so the invoker reports it the same way as an async panic.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(anyhow::anyhow!("blocking work did not complete: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_implement_work() {
        let work = |item: u32, _cancel: CancellationToken| async move {
            if item % 2 == 0 {
                anyhow::Ok(())
            } else {
                anyhow::bail!("odd item {item}")
            }
        };

        assert!(work.execute(2, CancellationToken::new()).await.is_ok());
        assert!(work.execute(3, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn blocking_adapter_runs_sync_function() {
        let work = blocking(|item: &String| {
            anyhow::ensure!(!item.is_empty(), "empty item");
            Ok(())
        });

        assert!(work.execute("a".to_string(), CancellationToken::new()).await.is_ok());
        let err = work
            .execute(String::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "empty item");
    }
}
