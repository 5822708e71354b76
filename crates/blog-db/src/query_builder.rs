//! Query Builder
//!
//! Turns table names, column lists, set maps and [`Filter`]s into
//! parameterized SQL plus the ordered argument list. Every structural problem
//! is reported as [`RepositoryError::QueryBuild`] here, before a statement is
//! ever sent to the database.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::filter::{Comparison, Filter};
use crate::repository::{RepositoryError, RepositoryResult};
use crate::value::SqlValue;

/// Column read back by `INSERT ... RETURNING`
pub const ID_COLUMN: &str = "id";

/// Column assignments of an UPDATE, rendered in key order
pub type SetMap = BTreeMap<String, SqlValue>;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid identifier regex")
});

/// Placeholder convention of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `$1, $2, ...`
    #[default]
    Postgres,
    /// `?, ?, ...`
    Question,
}

/// SQL text plus positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

/// Stateless SQL builder
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder {
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `INSERT INTO t (c...) VALUES (...) RETURNING "id"`
    pub fn build_insert(
        &self,
        table: &str,
        columns: &[&str],
        values: &[SqlValue],
    ) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;
        if columns.is_empty() {
            return Err(build_error("insert statements must have at least one column"));
        }
        if columns.len() != values.len() {
            return Err(build_error(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        for column in columns {
            validate_identifier(column, "column")?;
        }

        let mut w = self.writer();
        w.sql.push_str("INSERT INTO ");
        w.sql.push_str(table);
        w.sql.push_str(" (");
        w.sql.push_str(&columns.join(","));
        w.sql.push_str(") VALUES (");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                w.sql.push(',');
            }
            w.push_arg(value.clone())?;
        }
        w.sql.push_str(") RETURNING \"");
        w.sql.push_str(ID_COLUMN);
        w.sql.push('"');
        Ok(w.finish())
    }

    /// `SELECT * FROM t`
    ///
    /// No LIMIT/OFFSET is applied; result size is unbounded.
    pub fn build_select_all(&self, table: &str) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;
        Ok(BuiltQuery {
            sql: format!("SELECT * FROM {}", table),
            args: Vec::new(),
        })
    }

    /// `SELECT c... FROM t WHERE ... [LIMIT n]`; pass `["*"]` to project every column
    pub fn build_select_filtered(
        &self,
        table: &str,
        columns: &[&str],
        filter: &Filter,
        limit: Option<u64>,
    ) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;
        if columns.is_empty() {
            return Err(build_error("select statements must have at least one result column"));
        }
        for column in columns {
            if *column != "*" {
                validate_identifier(column, "column")?;
            }
        }

        let mut w = self.writer();
        w.sql.push_str("SELECT ");
        w.sql.push_str(&columns.join(", "));
        w.sql.push_str(" FROM ");
        w.sql.push_str(table);
        w.sql.push_str(" WHERE ");
        w.write_filter(filter)?;
        if let Some(limit) = limit {
            w.sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(w.finish())
    }

    /// `UPDATE t SET a = $1, ... WHERE ...`
    pub fn build_update(
        &self,
        table: &str,
        set: &SetMap,
        filter: &Filter,
    ) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;
        if set.is_empty() {
            return Err(build_error("update statements must have at least one Set clause"));
        }

        let mut w = self.writer();
        w.sql.push_str("UPDATE ");
        w.sql.push_str(table);
        w.sql.push_str(" SET ");
        for (i, (column, value)) in set.iter().enumerate() {
            validate_identifier(column, "column")?;
            if i > 0 {
                w.sql.push_str(", ");
            }
            w.sql.push_str(column);
            w.sql.push_str(" = ");
            w.push_arg(value.clone())?;
        }
        w.sql.push_str(" WHERE ");
        w.write_filter(filter)?;
        Ok(w.finish())
    }

    /// `DELETE FROM t WHERE ...`
    pub fn build_delete(&self, table: &str, filter: &Filter) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;

        let mut w = self.writer();
        w.sql.push_str("DELETE FROM ");
        w.sql.push_str(table);
        w.sql.push_str(" WHERE ");
        w.write_filter(filter)?;
        Ok(w.finish())
    }

    /// `SELECT count(*) AS count FROM t [WHERE ...]`
    ///
    /// `None` counts the whole table and emits no WHERE clause at all.
    pub fn build_count(&self, table: &str, filter: Option<&Filter>) -> RepositoryResult<BuiltQuery> {
        validate_identifier(table, "table")?;

        let mut w = self.writer();
        w.sql.push_str("SELECT count(*) AS count FROM ");
        w.sql.push_str(table);
        if let Some(filter) = filter {
            w.sql.push_str(" WHERE ");
            w.write_filter(filter)?;
        }
        Ok(w.finish())
    }

    fn writer(&self) -> SqlWriter {
        SqlWriter {
            dialect: self.dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }
}

struct SqlWriter {
    dialect: Dialect,
    sql: String,
    args: Vec<SqlValue>,
}

impl SqlWriter {
    /// Bind `value` as the next placeholder. NULL is written as a literal so
    /// that the server infers the column type instead of a text parameter.
    fn push_arg(&mut self, value: SqlValue) -> RepositoryResult<()> {
        match value {
            SqlValue::Null => self.sql.push_str("NULL"),
            SqlValue::Unsupported(type_name) => {
                return Err(build_error(format!(
                    "values of unsupported type {} cannot be bound",
                    type_name
                )))
            }
            value => {
                self.args.push(value);
                self.push_placeholder();
            }
        }
        Ok(())
    }

    fn push_placeholder(&mut self) {
        match self.dialect {
            Dialect::Postgres => {
                self.sql.push('$');
                self.sql.push_str(&self.args.len().to_string());
            }
            Dialect::Question => self.sql.push('?'),
        }
    }

    fn write_filter(&mut self, filter: &Filter) -> RepositoryResult<()> {
        match filter {
            Filter::Compare { column, op, value } => {
                validate_identifier(column, "column")?;
                match (op, value) {
                    (Comparison::Eq, SqlValue::Null) => {
                        self.sql.push_str(&format!("{} IS NULL", column));
                    }
                    (Comparison::NotEq, SqlValue::Null) => {
                        self.sql.push_str(&format!("{} IS NOT NULL", column));
                    }
                    (_, SqlValue::Null) => {
                        return Err(build_error(format!(
                            "cannot compare {} with NULL using {}",
                            column,
                            op.as_sql()
                        )));
                    }
                    _ => {
                        self.sql.push_str(column);
                        self.sql.push(' ');
                        self.sql.push_str(op.as_sql());
                        self.sql.push(' ');
                        self.push_arg(value.clone())?;
                    }
                }
            }
            Filter::In { column, values } => {
                validate_identifier(column, "column")?;
                if values.is_empty() {
                    self.sql.push_str("(1=0)");
                    return Ok(());
                }
                self.sql.push_str(column);
                self.sql.push_str(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push(',');
                    }
                    self.push_arg(value.clone())?;
                }
                self.sql.push(')');
            }
            Filter::IsNull(column) => {
                validate_identifier(column, "column")?;
                self.sql.push_str(&format!("{} IS NULL", column));
            }
            Filter::IsNotNull(column) => {
                validate_identifier(column, "column")?;
                self.sql.push_str(&format!("{} IS NOT NULL", column));
            }
            Filter::And(items) => self.write_group(items, " AND ", "(1=1)")?,
            Filter::Or(items) => self.write_group(items, " OR ", "(1=0)")?,
            Filter::Not(inner) => {
                self.sql.push_str("NOT (");
                self.write_filter(inner)?;
                self.sql.push(')');
            }
            Filter::Raw { fragment, args } => {
                if fragment.trim().is_empty() {
                    return Err(build_error("raw filter fragment is empty"));
                }
                let markers = fragment.matches('?').count();
                if markers != args.len() {
                    return Err(build_error(format!(
                        "raw filter has {} placeholders but {} arguments",
                        markers,
                        args.len()
                    )));
                }
                let mut args = args.iter();
                self.sql.push('(');
                for (i, part) in fragment.split('?').enumerate() {
                    if i > 0 {
                        if let Some(arg) = args.next() {
                            self.push_arg(arg.clone())?;
                        }
                    }
                    self.sql.push_str(part);
                }
                self.sql.push(')');
            }
        }
        Ok(())
    }

    fn write_group(&mut self, items: &[Filter], sep: &str, empty: &str) -> RepositoryResult<()> {
        if items.is_empty() {
            self.sql.push_str(empty);
            return Ok(());
        }
        self.sql.push('(');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            self.write_filter(item)?;
        }
        self.sql.push(')');
        Ok(())
    }

    fn finish(self) -> BuiltQuery {
        BuiltQuery {
            sql: self.sql,
            args: self.args,
        }
    }
}

fn validate_identifier(name: &str, what: &str) -> RepositoryResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(build_error(format!("invalid {} name {:?}", what, name)))
    }
}

fn build_error(message: impl Into<String>) -> RepositoryError {
    RepositoryError::QueryBuild(message.into())
}
