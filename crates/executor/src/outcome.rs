//! Per-item, per-pass results.

use std::time::Duration;

use thiserror::Error;

/// Why a single invocation did not succeed.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The work function reported an error.
    #[error("work failed: {0:#}")]
    Failed(anyhow::Error),

    /// The per-item deadline elapsed before the work function returned.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The run was cancelled while the invocation was in flight.
    #[error("cancelled before completion")]
    Cancelled,

    /// The work function panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl ItemError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ItemError::TimedOut(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Cancelled)
    }
}

/// Result of one invocation: the item and, on failure, why.
#[derive(Debug)]
pub struct Outcome<T> {
    item: T,
    error: Option<ItemError>,
}

impl<T> Outcome<T> {
    pub fn success(item: T) -> Self {
        Self { item, error: None }
    }

    pub fn failure(item: T, error: ItemError) -> Self {
        Self {
            item,
            error: Some(error),
        }
    }

    pub fn item(&self) -> &T {
        &self.item
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_parts(self) -> (T, Option<ItemError>) {
        (self.item, self.error)
    }
}
