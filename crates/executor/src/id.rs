//! Run identity and the item identifier bound.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single run (one call into the executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 so identifiers sort by start time in logs.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Bound for caller-supplied work item identifiers.
///
/// The executor never inspects an identifier; it only moves and clones it
/// between stages and prints it in diagnostics.
pub trait ItemId: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> ItemId for T where T: Clone + fmt::Debug + Send + Sync + 'static {}
