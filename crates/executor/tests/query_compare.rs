//! Checking a batch of queries against a primary and a replica store.

use std::sync::Arc;
use std::time::Duration;

use batchpass_diff::{Mode, diff, render};
use batchpass_executor::{BatchExecutor, CancellationToken, ExecutorConfig, RunError};
use batchpass_observability::LogFormat;
use batchpass_store::{InMemoryRepo, Repo, Row};
use serde_json::{Value, json};

struct Stores {
    primary: Arc<dyn Repo>,
    replica: Arc<dyn Repo>,
}

fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => panic!("not an object: {other}"),
            })
            .collect(),
        other => panic!("not an array: {other}"),
    }
}

async fn compare(stores: Arc<Stores>, statement: String) -> anyhow::Result<()> {
    let left = Value::from(stores.primary.query(&statement, &[]).await?);
    let right = Value::from(stores.replica.query(&statement, &[]).await?);

    let differences = diff(&left, &right, Mode::Unordered);
    if !differences.is_empty() {
        anyhow::bail!("{statement} differs:\n{}", render(&differences));
    }
    Ok(())
}

fn executor() -> BatchExecutor {
    batchpass_observability::init_with(LogFormat::Test);
    BatchExecutor::new(
        ExecutorConfig::new()
            .with_max_concurrency(2)
            .with_max_retries(2)
            .with_retry_delay(Duration::ZERO),
    )
}

const USERS: &str = "SELECT id, name FROM users";
const ORDERS: &str = "SELECT id, total FROM orders";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_stores_pass_in_one_attempt() {
    let primary = InMemoryRepo::new()
        .with_rows(USERS, rows(json!([{"id": 1, "name": "ada"}, {"id": 2, "name": "bob"}])))
        .with_rows(ORDERS, rows(json!([{"id": 10, "total": 42}])));
    // Replica returns users in another order and totals as floats.
    let replica = InMemoryRepo::new()
        .with_rows(USERS, rows(json!([{"id": 2, "name": "bob"}, {"id": 1, "name": "ada"}])))
        .with_rows(ORDERS, rows(json!([{"id": 10, "total": 42.0}])));
    let stores = Arc::new(Stores {
        primary: Arc::new(primary),
        replica: Arc::new(replica),
    });

    let work = move |statement: String, _: CancellationToken| compare(stores.clone(), statement);
    let report = executor()
        .run([USERS.to_string(), ORDERS.to_string()], work)
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn diverging_query_is_reported_after_retries() {
    let primary = InMemoryRepo::new()
        .with_rows(USERS, rows(json!([{"id": 1, "name": "ada"}])))
        .with_rows(ORDERS, rows(json!([{"id": 10, "total": 42}])));
    let replica = Arc::new(
        InMemoryRepo::new()
            .with_rows(USERS, rows(json!([{"id": 1, "name": "ada"}])))
            .with_rows(ORDERS, rows(json!([{"id": 10, "total": 41}]))),
    );
    let stores = Arc::new(Stores {
        primary: Arc::new(primary),
        replica: replica.clone(),
    });

    let work = move |statement: String, _: CancellationToken| compare(stores.clone(), statement);
    let err = executor()
        .run([USERS.to_string(), ORDERS.to_string()], work)
        .await
        .unwrap_err();

    let RunError::RetriesExhausted { failed, attempts, .. } = err else {
        panic!("expected retries to be exhausted");
    };
    assert_eq!(failed, vec![ORDERS.to_string()]);
    assert_eq!(attempts, 3);
    let orders_queries = replica
        .executed()
        .iter()
        .filter(|e| e.statement == ORDERS)
        .count();
    assert_eq!(orders_queries, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_errors_recover_on_retry() {
    let primary = Arc::new(InMemoryRepo::new().with_failure(USERS, "connection reset"));
    let replica = InMemoryRepo::new();
    let stores = Arc::new(Stores {
        primary: primary.clone(),
        replica: Arc::new(replica),
    });

    let work = {
        let primary = primary.clone();
        move |statement: String, _: CancellationToken| {
            let stores = stores.clone();
            let primary = primary.clone();
            async move {
                let result = compare(stores, statement.clone()).await;
                primary.clear_failure(&statement);
                result
            }
        }
    };

    let report = executor().run([USERS.to_string()], work).await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.passes[0].failed, 1);
}
