use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::repo::{Repo, Row, StoreError};

/// A statement the repo was asked to run, with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub statement: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct State {
    rows: HashMap<String, Vec<Row>>,
    failures: HashMap<String, String>,
    executed: Vec<Executed>,
}

/// In-memory [`Repo`] keyed by exact statement text.
///
/// Intended for tests. Queries for a statement with no canned rows return an
/// empty result.
#[derive(Debug, Default)]
pub struct InMemoryRepo {
    state: RwLock<State>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rows` for every query of `statement`.
    pub fn with_rows(self, statement: impl Into<String>, rows: Vec<Row>) -> Self {
        self.set_rows(statement, rows);
        self
    }

    /// Fail every query or exec of `statement` with `message`.
    pub fn with_failure(self, statement: impl Into<String>, message: impl Into<String>) -> Self {
        self.set_failure(statement, message);
        self
    }

    pub fn set_rows(&self, statement: impl Into<String>, rows: Vec<Row>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.rows.insert(statement.into(), rows);
    }

    pub fn set_failure(&self, statement: impl Into<String>, message: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failures.insert(statement.into(), message.into());
    }

    pub fn clear_failure(&self, statement: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failures.remove(statement);
    }

    /// Every statement seen so far, in call order.
    pub fn executed(&self) -> Vec<Executed> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.executed.clone()
    }

    fn record(&self, statement: &str, args: &[Value]) -> Result<(), StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        state.executed.push(Executed {
            statement: statement.to_string(),
            args: args.to_vec(),
        });
        match state.failures.get(statement) {
            Some(message) => Err(StoreError::Storage(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repo for InMemoryRepo {
    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.record(statement, args)?;
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;
        Ok(state.rows.get(statement).cloned().unwrap_or_default())
    }

    async fn exec(&self, statement: &str, args: &[Value]) -> Result<(), StoreError> {
        self.record(statement, args)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test]
    async fn serves_canned_rows_and_records_calls() {
        let repo = InMemoryRepo::new().with_rows(
            "SELECT id, name FROM users",
            vec![row(json!({"id": 1, "name": "ada"}))],
        );

        let rows = repo.query("SELECT id, name FROM users", &[]).await.unwrap();
        assert_eq!(rows, vec![row(json!({"id": 1, "name": "ada"}))]);

        repo.exec("DELETE FROM users WHERE id = $1", &[json!(1)])
            .await
            .unwrap();

        let executed = repo.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[1].statement, "DELETE FROM users WHERE id = $1");
        assert_eq!(executed[1].args, vec![json!(1)]);
    }

    #[tokio::test]
    async fn unknown_statement_returns_no_rows() {
        let repo = InMemoryRepo::new();
        assert!(repo.query("SELECT 1", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn configured_failure_surfaces_until_cleared() {
        let repo = InMemoryRepo::new().with_failure("SELECT 1", "connection reset");

        let err = repo.query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "storage error: connection reset");

        repo.clear_failure("SELECT 1");
        assert!(repo.query("SELECT 1", &[]).await.is_ok());
        assert_eq!(repo.executed().len(), 2);
    }

    #[tokio::test]
    async fn shared_repo_is_usable_through_arc() {
        let repo: Arc<dyn Repo> = Arc::new(InMemoryRepo::new());
        repo.exec("TRUNCATE t", &[]).await.unwrap();
    }
}
