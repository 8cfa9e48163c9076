//! Postgres-backed [`Repo`].
//!
//! ## Column mapping
//!
//! | Postgres type | JSON value |
//! |---------------|------------|
//! | `BOOL` | bool |
//! | `INT2`, `INT4`, `INT8` | integer |
//! | `FLOAT4`, `FLOAT8` | number (`null` for NaN or infinity) |
//! | `TEXT`, `VARCHAR`, `BPCHAR`, `NAME` | string |
//! | `JSON`, `JSONB` | the stored document |
//! | `UUID` | hyphenated string |
//! | `TIMESTAMPTZ` | RFC 3339 string in UTC |
//! | `TIMESTAMP`, `DATE` | ISO 8601 string |
//!
//! SQL `NULL` always becomes JSON `null`. Any other column type fails the
//! query with [`StoreError::UnsupportedType`].
//!
//! ## Arguments
//!
//! Integers that fit `i64` bind as `INT8`, other numbers as `FLOAT8`. An
//! unsigned integer above `i64::MAX` binds as its decimal text so no digits
//! are lost; cast it in the statement (`$1::numeric`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Connection, PgPool, Postgres, Row as _, TypeInfo};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::repo::{Repo, Row, StoreError};

const MAX_CONNECTIONS: u32 = 16;

#[derive(Debug, Clone)]
pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    /// Open a pool for `dsn` and ping it once before handing it out.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(dsn)
            .await?;

        let mut conn = pool.acquire().await?;
        conn.ping().await?;
        drop(conn);

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repo for PgRepo {
    #[instrument(skip(self, args), fields(args = args.len()), err)]
    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        let rows = bind_all(sqlx::query(statement), args)
            .fetch_all(&self.pool)
            .await?;
        debug!(rows = rows.len(), "query returned");

        rows.iter().map(row_to_json).collect()
    }

    #[instrument(skip(self, args), fields(args = args.len()), err)]
    async fn exec(&self, statement: &str, args: &[Value]) -> Result<(), StoreError> {
        let done = bind_all(sqlx::query(statement), args)
            .execute(&self.pool)
            .await?;
        debug!(rows_affected = done.rows_affected(), "statement executed");
        Ok(())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match number_arg(n) {
                NumberArg::Int(i) => query.bind(i),
                NumberArg::Float(f) => query.bind(f),
                NumberArg::Decimal(text) => query.bind(text),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(Json(other.clone())),
        };
    }
    query
}

#[derive(Debug, PartialEq)]
enum NumberArg {
    Int(i64),
    Float(f64),
    Decimal(String),
}

fn number_arg(n: &Number) -> NumberArg {
    if let Some(i) = n.as_i64() {
        NumberArg::Int(i)
    } else if n.is_u64() {
        NumberArg::Decimal(n.to_string())
    } else {
        NumberArg::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn row_to_json(row: &PgRow) -> Result<Row, StoreError> {
    let mut out = Row::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)?
                .and_then(|f| float_to_json(f64::from(f))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.and_then(float_to_json),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(i)?.map(Value::String)
            }
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i)?,
            "UUID" => row
                .try_get::<Option<Uuid>, _>(i)?
                .map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)?
                .map(|t| Value::String(t.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)?
                .map(|t| Value::String(t.to_string())),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(i)?
                .map(|d| Value::String(d.to_string())),
            other => {
                return Err(StoreError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                });
            }
        };
        out.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

fn float_to_json(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}
