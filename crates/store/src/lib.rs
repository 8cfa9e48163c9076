//! Query/exec capability used by work functions that compare query results.
//!
//! [`Repo`] is the seam; [`PgRepo`] talks to Postgres through `sqlx` and
//! [`InMemoryRepo`] serves canned rows in tests.

pub mod in_memory;
pub mod postgres;
pub mod repo;

pub use in_memory::{Executed, InMemoryRepo};
pub use postgres::PgRepo;
pub use repo::{Repo, Row, StoreError};
