use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("column `{column}` has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Runs statements against a backing store.
///
/// Positional arguments are JSON values; rows come back as JSON objects so
/// that results from different stores can be compared structurally.
#[async_trait]
pub trait Repo: Send + Sync {
    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, StoreError>;

    async fn exec(&self, statement: &str, args: &[Value]) -> Result<(), StoreError>;
}

#[async_trait]
impl<R: Repo + ?Sized> Repo for std::sync::Arc<R> {
    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        (**self).query(statement, args).await
    }

    async fn exec(&self, statement: &str, args: &[Value]) -> Result<(), StoreError> {
        (**self).exec(statement, args).await
    }
}
