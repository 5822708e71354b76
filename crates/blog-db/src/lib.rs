//! # blog-db
//!
//! Generic data-access layer for the blog backend.
//!
//! This crate provides PostgreSQL access using SQLx, including:
//!
//! - Connection pool management
//! - A generic repository for any [`Record`] bound to one table
//! - Transaction handles with a strict `Open -> Committed | RolledBack` lifecycle
//! - A query builder rendering [`Filter`] trees into parameterized SQL
//!
//! ## Example
//!
//! ```ignore
//! use blog_db::{CrudStore, Database, DatabaseConfig, Filter, QueryContext};
//!
//! let db = Database::connect(&DatabaseConfig::with_url(url)).await?;
//! let authors = db.repository::<Author>("authors");
//!
//! let ctx = QueryContext::background();
//! let mut id = SqlValue::Null;
//! authors.insert(&ctx, &author, Some(&mut id)).await?;
//! let found = authors.find_one(&ctx, &Filter::eq("id", id)).await?;
//! ```

pub mod context;
pub mod executor;
pub mod filter;
pub mod mapper;
pub mod pool;
pub mod query_builder;
pub mod repository;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

// Re-exports
pub use context::{Interrupted, QueryContext};
pub use executor::{ExecError, Executor};
pub use filter::{Comparison, Filter};
pub use mapper::{ColumnMapper, ColumnPairs, Field, Record};
pub use pool::{Database, DatabaseConfig, PoolStats};
pub use query_builder::{BuiltQuery, Dialect, QueryBuilder, SetMap, ID_COLUMN};
pub use repository::{
    CrudStore, Operation, Repository, RepositoryError, RepositoryResult, SoftDelete,
    TransactionalRepository,
};
pub use transaction::{
    IsolationLevel, PgTransaction, TransactionHandle, TransactionSource, TxBackend, TxOptions,
    TxState,
};
pub use value::{FromSqlValue, Row, SqlValue, ValueError};
