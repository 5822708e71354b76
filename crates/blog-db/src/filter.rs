//! Row filters
//!
//! Predicates accepted by `find`, `find_one`, `update`, `remove` and `count`.
//! The query builder renders them into a WHERE clause; repositories only pass
//! them through.

use crate::value::SqlValue;

/// Comparison operator of a single-column filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "<>",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Like => "LIKE",
        }
    }
}

/// A predicate restricting which rows an operation targets
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column <op> value`
    Compare {
        column: String,
        op: Comparison,
        value: SqlValue,
    },
    /// `column IN (values...)`
    In { column: String, values: Vec<SqlValue> },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Verbatim SQL fragment with `?` placeholders, renumbered on build
    Raw { fragment: String, args: Vec<SqlValue> },
}

impl Filter {
    fn compare(column: impl Into<String>, op: Comparison, value: impl Into<SqlValue>) -> Self {
        Filter::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Equality; a NULL value renders as `IS NULL`
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::Eq, value)
    }

    /// Inequality; a NULL value renders as `IS NOT NULL`
    pub fn not_eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::NotEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, Comparison::Lte, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, Comparison::Like, SqlValue::Text(pattern.into()))
    }

    pub fn in_list<V: Into<SqlValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::IsNotNull(column.into())
    }

    pub fn raw(fragment: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Filter::Raw {
            fragment: fragment.into(),
            args,
        }
    }

    /// Combine with another filter, flattening nested ANDs
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut items) => {
                items.push(other);
                Filter::And(items)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Combine with another filter, flattening nested ORs
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut items) => {
                items.push(other);
                Filter::Or(items)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }
}
