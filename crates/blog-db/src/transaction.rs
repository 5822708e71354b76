//! Transaction handles
//!
//! A [`TransactionHandle`] owns exactly one backend transaction and moves
//! through `Open -> Committed | RolledBack`. Both terminal states are final:
//! a second commit/rollback, or any statement issued through a repository
//! derived from the handle afterwards, fails with
//! [`RepositoryError::TransactionState`].
//!
//! The handle is meant to be driven by the task that began it. Statements
//! need `&mut` access to the transaction's connection while [`Executor`]
//! methods take `&self`, so the slot sits behind an async mutex and clones
//! serialize on it. Dropping the last clone while still open rolls the
//! transaction back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;

use crate::executor::{self, ExecError, Executor};
use crate::query_builder::BuiltQuery;
use crate::repository::{Operation, RepositoryError, RepositoryResult};
use crate::value::Row;

/// sqlx transaction used by the Postgres backend
pub type PgTransaction = sqlx::Transaction<'static, Postgres>;

/// Target name reported in errors raised by commit/rollback
pub const TRANSACTION_TARGET: &str = "<transaction>";

/// Lifecycle state of a transaction handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Open => write!(f, "open"),
            TxState::Committed => write!(f, "committed"),
            TxState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Isolation level requested when beginning a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options for `begin_transaction`; the default is the backend's isolation
/// level, read-write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TxOptions {
    /// `SET TRANSACTION ...` statement, or `None` when defaults apply
    pub fn set_transaction_sql(&self) -> Option<String> {
        let mut modes = Vec::new();
        if let Some(level) = self.isolation {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if self.read_only {
            modes.push("READ ONLY".to_string());
        }
        if modes.is_empty() {
            None
        } else {
            Some(format!("SET TRANSACTION {}", modes.join(" ")))
        }
    }
}

/// An open backend transaction
#[async_trait]
pub trait TxBackend: Send + Sized + 'static {
    async fn execute(&mut self, query: &BuiltQuery) -> Result<u64, ExecError>;
    async fn fetch_one(&mut self, query: &BuiltQuery) -> Result<Row, ExecError>;
    async fn fetch_all(&mut self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError>;
    async fn commit(self) -> Result<(), sqlx::Error>;
    async fn rollback(self) -> Result<(), sqlx::Error>;
}

/// An executor that can start transactions
#[async_trait]
pub trait TransactionSource: Executor {
    type Tx: TxBackend;

    async fn begin(&self, options: &TxOptions) -> Result<Self::Tx, sqlx::Error>;
}

// Statements prepared inside the transaction stay cached on its connection
// and are released by the connection, not per call.
#[async_trait]
impl TxBackend for PgTransaction {
    async fn execute(&mut self, query: &BuiltQuery) -> Result<u64, ExecError> {
        executor::execute_on(&mut **self, query, true).await
    }

    async fn fetch_one(&mut self, query: &BuiltQuery) -> Result<Row, ExecError> {
        executor::fetch_one_on(&mut **self, query, true).await
    }

    async fn fetch_all(&mut self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError> {
        executor::fetch_all_on(&mut **self, query, true).await
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::commit(self).await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        sqlx::Transaction::rollback(self).await
    }
}

#[async_trait]
impl TransactionSource for PgPool {
    type Tx = PgTransaction;

    async fn begin(&self, options: &TxOptions) -> Result<PgTransaction, sqlx::Error> {
        let mut tx = sqlx::Pool::begin(self).await?;
        if let Some(sql) = options.set_transaction_sql() {
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        Ok(tx)
    }
}

enum Slot<T> {
    Open(T),
    Closed(TxState),
}

/// Lifecycle owner of one open transaction
pub struct TransactionHandle<T: TxBackend = PgTransaction> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T: TxBackend> Clone for TransactionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: TxBackend> fmt::Debug for TransactionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle").finish_non_exhaustive()
    }
}

impl<T: TxBackend> TransactionHandle<T> {
    pub fn new(tx: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Open(tx))),
        }
    }

    pub async fn state(&self) -> TxState {
        match &*self.slot.lock().await {
            Slot::Open(_) => TxState::Open,
            Slot::Closed(state) => *state,
        }
    }

    /// Commit the transaction. The handle is terminal afterwards, even when
    /// the backend reports a failure.
    pub async fn commit(&self) -> RepositoryResult<()> {
        let tx = self.close(TxState::Committed, Operation::Commit).await?;
        tracing::debug!("committing transaction");
        tx.commit()
            .await
            .map_err(|source| RepositoryError::Execution {
                op: Operation::Commit,
                table: TRANSACTION_TARGET.to_string(),
                source,
            })
    }

    /// Abort the transaction. The handle is terminal afterwards.
    pub async fn rollback(&self) -> RepositoryResult<()> {
        let tx = self.close(TxState::RolledBack, Operation::Rollback).await?;
        tracing::debug!("rolling back transaction");
        tx.rollback()
            .await
            .map_err(|source| RepositoryError::Execution {
                op: Operation::Rollback,
                table: TRANSACTION_TARGET.to_string(),
                source,
            })
    }

    async fn close(&self, next: TxState, attempted: Operation) -> RepositoryResult<T> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Closed(next)) {
            Slot::Open(tx) => Ok(tx),
            Slot::Closed(state) => {
                *slot = Slot::Closed(state);
                Err(RepositoryError::TransactionState { state, attempted })
            }
        }
    }
}

#[async_trait]
impl<T: TxBackend> Executor for TransactionHandle<T> {
    async fn execute(&self, query: &BuiltQuery) -> Result<u64, ExecError> {
        match &mut *self.slot.lock().await {
            Slot::Open(tx) => tx.execute(query).await,
            Slot::Closed(state) => Err(ExecError::TransactionClosed(*state)),
        }
    }

    async fn fetch_one(&self, query: &BuiltQuery) -> Result<Row, ExecError> {
        match &mut *self.slot.lock().await {
            Slot::Open(tx) => tx.fetch_one(query).await,
            Slot::Closed(state) => Err(ExecError::TransactionClosed(*state)),
        }
    }

    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError> {
        match &mut *self.slot.lock().await {
            Slot::Open(tx) => tx.fetch_all(query).await,
            Slot::Closed(state) => Err(ExecError::TransactionClosed(*state)),
        }
    }
}
