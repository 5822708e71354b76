//! Statement execution
//!
//! [`Executor`] is the seam between repositories and the database: the pool
//! implements it directly, an open [`TransactionHandle`] implements it by
//! running statements on its transaction, and tests plug in recording fakes.
//!
//! [`TransactionHandle`]: crate::transaction::TransactionHandle

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use uuid::Uuid;

use crate::query_builder::BuiltQuery;
use crate::transaction::TxState;
use crate::value::{Row, SqlValue};

/// Failure of a single execution, before repository context is attached
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Bind(String),

    #[error("transaction is already {0}")]
    TransactionClosed(TxState),
}

/// Runs built statements
#[async_trait]
pub trait Executor: Send + Sync {
    /// Plain execution; returns the number of affected rows
    async fn execute(&self, query: &BuiltQuery) -> Result<u64, ExecError>;

    /// Query-returning execution; the first row, `RowNotFound` when there is none
    async fn fetch_one(&self, query: &BuiltQuery) -> Result<Row, ExecError>;

    /// Query-returning execution; every row
    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError>;
}

/// Pool-bound execution. Statements are not cached on the pooled
/// connection, so each call prepares, runs and releases its statement.
#[async_trait]
impl Executor for PgPool {
    async fn execute(&self, query: &BuiltQuery) -> Result<u64, ExecError> {
        execute_on(self, query, false).await
    }

    async fn fetch_one(&self, query: &BuiltQuery) -> Result<Row, ExecError> {
        fetch_one_on(self, query, false).await
    }

    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError> {
        fetch_all_on(self, query, false).await
    }
}

pub(crate) async fn execute_on<'c, E>(
    executor: E,
    query: &BuiltQuery,
    persistent: bool,
) -> Result<u64, ExecError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let result = prepare(query, persistent)?.execute(executor).await?;
    Ok(result.rows_affected())
}

pub(crate) async fn fetch_one_on<'c, E>(
    executor: E,
    query: &BuiltQuery,
    persistent: bool,
) -> Result<Row, ExecError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let row = prepare(query, persistent)?.fetch_one(executor).await?;
    decode_row(&row)
}

pub(crate) async fn fetch_all_on<'c, E>(
    executor: E,
    query: &BuiltQuery,
    persistent: bool,
) -> Result<Vec<Row>, ExecError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let rows = prepare(query, persistent)?.fetch_all(executor).await?;
    rows.iter().map(decode_row).collect()
}

fn prepare(query: &BuiltQuery, persistent: bool) -> Result<Query<'_, Postgres, PgArguments>, ExecError> {
    let mut q = sqlx::query(&query.sql).persistent(persistent);
    for arg in &query.args {
        q = match arg {
            // built queries render NULL as a literal; this covers hand-made ones
            SqlValue::Null => q.bind(None::<String>),
            SqlValue::Bool(b) => q.bind(*b),
            SqlValue::Int(n) => q.bind(*n),
            SqlValue::Float(f) => q.bind(*f),
            SqlValue::Text(s) => q.bind(s.clone()),
            SqlValue::Uuid(id) => q.bind(*id),
            SqlValue::Timestamp(ts) => q.bind(*ts),
            SqlValue::IntArray(items) => q.bind(items.clone()),
            SqlValue::Json(json) => q.bind(sqlx::types::Json(json.clone())),
            SqlValue::Unsupported(type_name) => {
                return Err(ExecError::Bind(format!(
                    "cannot bind a value of unsupported type {}",
                    type_name
                )))
            }
        };
    }
    Ok(q)
}

/// Decode a driver row into named `SqlValue`s by column type.
///
/// Types outside the supported set decode as [`SqlValue::Unsupported`] so
/// that columns a record does not map never fail the row.
pub(crate) fn decode_row(row: &PgRow) -> Result<Row, ExecError> {
    let mut out = Row::new();
    for column in row.columns() {
        let i = column.ordinal();
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOL" => get::<bool>(row, i, name)?.map(SqlValue::Bool),
            "INT2" => get::<i16>(row, i, name)?.map(|n| SqlValue::Int(n.into())),
            "INT4" => get::<i32>(row, i, name)?.map(|n| SqlValue::Int(n.into())),
            "INT8" => get::<i64>(row, i, name)?.map(SqlValue::Int),
            "FLOAT4" => get::<f32>(row, i, name)?.map(|f| SqlValue::Float(f.into())),
            "FLOAT8" => get::<f64>(row, i, name)?.map(SqlValue::Float),
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => get::<String>(row, i, name)?.map(SqlValue::Text),
            "UUID" => get::<Uuid>(row, i, name)?.map(SqlValue::Uuid),
            "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, i, name)?.map(SqlValue::Timestamp),
            "TIMESTAMP" => get::<NaiveDateTime>(row, i, name)?
                .map(|ts| SqlValue::Timestamp(ts.and_utc())),
            "DATE" => get::<NaiveDate>(row, i, name)?
                .map(|date| SqlValue::Timestamp(date.and_time(NaiveTime::MIN).and_utc())),
            "INT4[]" => get::<Vec<i32>>(row, i, name)?
                .map(|items| SqlValue::IntArray(items.into_iter().map(i64::from).collect())),
            "INT8[]" => get::<Vec<i64>>(row, i, name)?.map(SqlValue::IntArray),
            "JSON" | "JSONB" => get::<serde_json::Value>(row, i, name)?.map(SqlValue::Json),
            other => Some(SqlValue::Unsupported(other.to_string())),
        };
        out.push(name, value.unwrap_or(SqlValue::Null));
    }
    Ok(out)
}

fn get<T>(row: &PgRow, index: usize, name: &str) -> Result<Option<T>, ExecError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|e| ExecError::Decode(format!("column \"{}\": {}", name, e)))
}
