//! Tracing setup shared by binaries and tests driving batch runs.

/// Tracing subscriber configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{LogFormat, init, init_with};
