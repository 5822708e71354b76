//! Repository traits and base implementations
//!
//! Provides generic CRUD operations for any [`Record`] bound to one table.
//! [`Repository`] is generic over the [`Executor`] it closes over: bound to a
//! `PgPool` it runs each call on a pooled connection, bound to a
//! [`TransactionHandle`] (see [`TransactionalRepository`]) it runs inside that
//! transaction. Both share the same query builder, column mapper and call
//! semantics.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::Span;

use crate::context::{Interrupted, QueryContext};
use crate::executor::{ExecError, Executor};
use crate::filter::Filter;
use crate::mapper::{ColumnMapper, ColumnPairs, Record};
use crate::query_builder::{BuiltQuery, Dialect, QueryBuilder, SetMap, ID_COLUMN};
use crate::transaction::{PgTransaction, TransactionHandle, TransactionSource, TxOptions, TxState};
use crate::value::{Row, SqlValue};

/// Operation names attached to errors and log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    FindAll,
    FindOne,
    Find,
    Update,
    Remove,
    Count,
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::FindAll => "find_all",
            Operation::FindOne => "find_one",
            Operation::Find => "find",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::Count => "count",
            Operation::Begin => "begin",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Invalid record type {record}: {reason}")]
    InvalidRecordType { record: &'static str, reason: String },

    #[error("Query build error: {0}")]
    QueryBuild(String),

    #[error("{op} on {table} failed: {source}")]
    Execution {
        op: Operation,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{op} on {table} could not scan result: {message}")]
    Scan {
        op: Operation,
        table: String,
        message: String,
    },

    #[error("Cannot {attempted}: transaction is already {state}")]
    TransactionState { state: TxState, attempted: Operation },

    #[error("{op} on {table} was cancelled")]
    Cancelled { op: Operation, table: String },

    #[error("{op} on {table} exceeded its deadline")]
    DeadlineExceeded { op: Operation, table: String },
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Columns written by a soft delete (`remove` with `physical == false`)
#[derive(Debug, Clone, PartialEq)]
pub struct SoftDelete {
    /// Flag column set to `inactive_value`
    pub status_column: String,
    pub inactive_value: SqlValue,
    /// Last-modified column set to the current time, if any
    pub updated_at_column: Option<String>,
}

impl Default for SoftDelete {
    fn default() -> Self {
        Self {
            status_column: "status".to_string(),
            inactive_value: SqlValue::Bool(false),
            updated_at_column: Some("updated_at".to_string()),
        }
    }
}

impl SoftDelete {
    /// Assignments applied by a soft delete issued now
    pub fn set_map(&self) -> SetMap {
        let mut set = SetMap::new();
        set.insert(self.status_column.clone(), self.inactive_value.clone());
        if let Some(column) = &self.updated_at_column {
            set.insert(column.clone(), SqlValue::Timestamp(Utc::now()));
        }
        set
    }
}

/// CRUD capability shared by pool-bound and transaction-bound repositories
#[async_trait]
pub trait CrudStore<R: Record>: Send + Sync {
    /// The table this store is bound to
    fn table(&self) -> &str;

    /// Insert one record. With `inserted_id`, the statement is run as a query
    /// and the generated `id` is written there; without it, as a plain execution.
    async fn insert(
        &self,
        ctx: &QueryContext,
        record: &R,
        inserted_id: Option<&mut SqlValue>,
    ) -> RepositoryResult<()>;

    /// Every row of the table. Unbounded: no pagination is applied.
    async fn find_all(&self, ctx: &QueryContext) -> RepositoryResult<Vec<R>>;

    /// The first row matching `filter`; no match is a `Scan` error
    async fn find_one(&self, ctx: &QueryContext, filter: &Filter) -> RepositoryResult<R>;

    async fn find(&self, ctx: &QueryContext, filter: &Filter) -> RepositoryResult<Vec<R>>;

    /// Apply `set` to the rows matching `filter`; returns rows affected
    async fn update(&self, ctx: &QueryContext, set: &SetMap, filter: &Filter) -> RepositoryResult<u64>;

    /// Delete rows physically, or soft-delete them through `update`
    async fn remove(&self, ctx: &QueryContext, filter: &Filter, physical: bool) -> RepositoryResult<u64>;

    /// Count rows; `None` counts the whole table
    async fn count(&self, ctx: &QueryContext, filter: Option<&Filter>) -> RepositoryResult<i64>;

    fn extract_column_pairs(&self, record: &R) -> RepositoryResult<ColumnPairs>;
}

/// Repository for one table, generic over the executor it runs on
pub struct Repository<R, E = PgPool> {
    table: Arc<str>,
    executor: E,
    builder: QueryBuilder,
    soft_delete: Option<SoftDelete>,
    span: Span,
    _record: PhantomData<fn() -> R>,
}

/// Repository bound to an open transaction
pub type TransactionalRepository<R, T = PgTransaction> = Repository<R, TransactionHandle<T>>;

impl<R, E: Clone> Clone for Repository<R, E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            executor: self.executor.clone(),
            builder: self.builder,
            soft_delete: self.soft_delete.clone(),
            span: self.span.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record, E: Executor> Repository<R, E> {
    /// Bind a repository to `table`, with the default soft-delete columns
    pub fn new(table: impl Into<Arc<str>>, executor: E) -> Self {
        let table = table.into();
        let span = tracing::debug_span!("repository", table = %table, record = R::NAME);
        Self {
            table,
            executor,
            builder: QueryBuilder::default(),
            soft_delete: Some(SoftDelete::default()),
            span,
            _record: PhantomData,
        }
    }

    pub fn with_soft_delete(mut self, soft_delete: SoftDelete) -> Self {
        self.soft_delete = Some(soft_delete);
        self
    }

    /// Disable soft deletes; `remove(.., false)` then fails without I/O
    pub fn without_soft_delete(mut self) -> Self {
        self.soft_delete = None;
        self
    }

    /// Render placeholders for `dialect` instead of PostgreSQL's `$n`
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.builder = QueryBuilder::new(dialect);
        self
    }

    /// Log through `span` instead of the repository's own span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn soft_delete(&self) -> Option<&SoftDelete> {
        self.soft_delete.as_ref()
    }

    /// The underlying pool or transaction handle
    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run<T, F>(&self, ctx: &QueryContext, op: Operation, query: &BuiltQuery, fut: F) -> RepositoryResult<T>
    where
        F: Future<Output = Result<T, ExecError>> + Send,
    {
        tracing::debug!(parent: &self.span, %op, sql = %query.sql, args = query.args.len(), "executing statement");

        let outcome = match ctx.run(fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => self.exec_error(op, e),
            Err(Interrupted::Cancelled) => RepositoryError::Cancelled {
                op,
                table: self.table.to_string(),
            },
            Err(Interrupted::DeadlineExceeded) => RepositoryError::DeadlineExceeded {
                op,
                table: self.table.to_string(),
            },
        };
        tracing::warn!(parent: &self.span, %op, error = %outcome, "statement failed");
        Err(outcome)
    }

    fn exec_error(&self, op: Operation, error: ExecError) -> RepositoryError {
        let table = self.table.to_string();
        match error {
            ExecError::Database(sqlx::Error::RowNotFound) => RepositoryError::Scan {
                op,
                table,
                message: "no rows in result set".to_string(),
            },
            ExecError::Database(source) => RepositoryError::Execution { op, table, source },
            ExecError::Decode(message) => RepositoryError::Scan { op, table, message },
            ExecError::Bind(message) => RepositoryError::QueryBuild(message),
            ExecError::TransactionClosed(state) => RepositoryError::TransactionState {
                state,
                attempted: op,
            },
        }
    }

    /// UPDATE reported as `op`, shared by `update` and soft deletes
    async fn execute_update(
        &self,
        ctx: &QueryContext,
        op: Operation,
        set: &SetMap,
        filter: &Filter,
    ) -> RepositoryResult<u64> {
        let query = self.builder.build_update(&self.table, set, filter)?;
        self.run(ctx, op, &query, self.executor.execute(&query)).await
    }

    fn hydrate_all(&self, rows: Vec<Row>, op: Operation) -> RepositoryResult<Vec<R>> {
        rows.iter()
            .map(|row| ColumnMapper::hydrate::<R>(row, op, &self.table))
            .collect()
    }
}

impl<R: Record, E: TransactionSource> Repository<R, E> {
    /// Start a transaction on the underlying pool
    pub async fn begin_transaction(
        &self,
        ctx: &QueryContext,
        options: TxOptions,
    ) -> RepositoryResult<TransactionHandle<E::Tx>> {
        tracing::debug!(parent: &self.span, ?options, "beginning transaction");

        let op = Operation::Begin;
        let tx = match ctx.run(self.executor.begin(&options)).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(source)) => {
                return Err(RepositoryError::Execution {
                    op,
                    table: self.table.to_string(),
                    source,
                })
            }
            Err(Interrupted::Cancelled) => {
                return Err(RepositoryError::Cancelled {
                    op,
                    table: self.table.to_string(),
                })
            }
            Err(Interrupted::DeadlineExceeded) => {
                return Err(RepositoryError::DeadlineExceeded {
                    op,
                    table: self.table.to_string(),
                })
            }
        };
        Ok(TransactionHandle::new(tx))
    }

    /// A repository for the same table running inside `handle`'s transaction
    pub fn with_transaction(&self, handle: &TransactionHandle<E::Tx>) -> TransactionalRepository<R, E::Tx> {
        Repository {
            table: Arc::clone(&self.table),
            executor: handle.clone(),
            builder: self.builder,
            soft_delete: self.soft_delete.clone(),
            span: self.span.clone(),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<R: Record, E: Executor> CrudStore<R> for Repository<R, E> {
    fn table(&self) -> &str {
        &self.table
    }

    async fn insert(
        &self,
        ctx: &QueryContext,
        record: &R,
        inserted_id: Option<&mut SqlValue>,
    ) -> RepositoryResult<()> {
        // NULL columns are left to database defaults
        let pairs = ColumnMapper::extract(record)?.without_nulls();
        let query = self
            .builder
            .build_insert(&self.table, pairs.columns(), pairs.values())?;

        match inserted_id {
            Some(dest) => {
                let op = Operation::Insert;
                let mut row = self.run(ctx, op, &query, self.executor.fetch_one(&query)).await?;
                *dest = row.take(ID_COLUMN).ok_or_else(|| RepositoryError::Scan {
                    op,
                    table: self.table.to_string(),
                    message: format!("missing \"{}\" in returned row", ID_COLUMN),
                })?;
            }
            None => {
                self.run(ctx, Operation::Insert, &query, self.executor.execute(&query))
                    .await?;
            }
        }
        Ok(())
    }

    async fn find_all(&self, ctx: &QueryContext) -> RepositoryResult<Vec<R>> {
        let query = self.builder.build_select_all(&self.table)?;
        let rows = self
            .run(ctx, Operation::FindAll, &query, self.executor.fetch_all(&query))
            .await?;
        self.hydrate_all(rows, Operation::FindAll)
    }

    async fn find_one(&self, ctx: &QueryContext, filter: &Filter) -> RepositoryResult<R> {
        let columns = ColumnMapper::columns::<R>()?;
        let query = self
            .builder
            .build_select_filtered(&self.table, &columns, filter, Some(1))?;
        let row = self
            .run(ctx, Operation::FindOne, &query, self.executor.fetch_one(&query))
            .await?;
        ColumnMapper::hydrate(&row, Operation::FindOne, &self.table)
    }

    async fn find(&self, ctx: &QueryContext, filter: &Filter) -> RepositoryResult<Vec<R>> {
        let query = self
            .builder
            .build_select_filtered(&self.table, &["*"], filter, None)?;
        let rows = self
            .run(ctx, Operation::Find, &query, self.executor.fetch_all(&query))
            .await?;
        self.hydrate_all(rows, Operation::Find)
    }

    async fn update(&self, ctx: &QueryContext, set: &SetMap, filter: &Filter) -> RepositoryResult<u64> {
        self.execute_update(ctx, Operation::Update, set, filter).await
    }

    async fn remove(&self, ctx: &QueryContext, filter: &Filter, physical: bool) -> RepositoryResult<u64> {
        if !physical {
            let soft_delete = self.soft_delete.as_ref().ok_or_else(|| {
                RepositoryError::QueryBuild(format!(
                    "soft delete is not configured for table {}",
                    self.table
                ))
            })?;
            return self
                .execute_update(ctx, Operation::Remove, &soft_delete.set_map(), filter)
                .await;
        }

        let query = self.builder.build_delete(&self.table, filter)?;
        self.run(ctx, Operation::Remove, &query, self.executor.execute(&query))
            .await
    }

    async fn count(&self, ctx: &QueryContext, filter: Option<&Filter>) -> RepositoryResult<i64> {
        let op = Operation::Count;
        let query = self.builder.build_count(&self.table, filter)?;
        let row = self.run(ctx, op, &query, self.executor.fetch_one(&query)).await?;

        row.first()
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| RepositoryError::Scan {
                op,
                table: self.table.to_string(),
                message: "count did not return an integer".to_string(),
            })
    }

    fn extract_column_pairs(&self, record: &R) -> RepositoryResult<ColumnPairs> {
        ColumnMapper::extract(record)
    }
}
