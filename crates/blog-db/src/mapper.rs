//! Column mapping between records and SQL
//!
//! A record type registers its columns once, as a static list of
//! [`Field`] descriptors. That list is the single source of column order:
//! the N-th column extracted always corresponds to the N-th value, and
//! projections for `find_one` use the same order.

use crate::repository::{Operation, RepositoryError, RepositoryResult};
use crate::value::{Row, SqlValue, ValueError};

/// Descriptor of one mapped field: column name, accessor and setter
pub struct Field<R> {
    pub column: &'static str,
    pub get: fn(&R) -> SqlValue,
    pub set: fn(&mut R, SqlValue) -> Result<(), ValueError>,
}

/// A typed value representing one table row
pub trait Record: Default + Send + Sync + 'static {
    /// Type name used in error messages
    const NAME: &'static str;

    /// Mapped fields in column order
    fn fields() -> &'static [Field<Self>];
}

/// Declare the field list of a record.
///
/// ```ignore
/// impl Record for Author {
///     const NAME: &'static str = "Author";
///
///     fn fields() -> &'static [Field<Self>] {
///         static FIELDS: &[Field<Author>] = record_fields!(Author {
///             id => "id",
///             first_name => "first_name",
///         });
///         FIELDS
///     }
/// }
/// ```
#[macro_export]
macro_rules! record_fields {
    ($record:ty { $($field:ident => $column:literal),+ $(,)? }) => {
        &[
            $(
                $crate::mapper::Field::<$record> {
                    column: $column,
                    get: |r: &$record| {
                        $crate::value::SqlValue::from(::std::clone::Clone::clone(&r.$field))
                    },
                    set: |r: &mut $record, v: $crate::value::SqlValue| {
                        r.$field = $crate::value::FromSqlValue::from_sql_value(v)?;
                        ::std::result::Result::Ok(())
                    },
                },
            )+
        ]
    };
}

/// Ordered column/value correspondence derived from a record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnPairs {
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl ColumnPairs {
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Drop pairs whose value is NULL, keeping the relative order
    pub fn without_nulls(self) -> Self {
        let (columns, values) = self
            .columns
            .into_iter()
            .zip(self.values)
            .filter(|(_, v)| !v.is_null())
            .unzip();
        Self { columns, values }
    }

    pub fn into_parts(self) -> (Vec<&'static str>, Vec<SqlValue>) {
        (self.columns, self.values)
    }
}

/// Stateless mapper shared by every repository
pub struct ColumnMapper;

impl ColumnMapper {
    /// Extract the column/value pairs of a record
    pub fn extract<R: Record>(record: &R) -> RepositoryResult<ColumnPairs> {
        let fields = Self::validated_fields::<R>()?;

        let mut pairs = ColumnPairs {
            columns: Vec::with_capacity(fields.len()),
            values: Vec::with_capacity(fields.len()),
        };
        for field in fields {
            pairs.columns.push(field.column);
            pairs.values.push((field.get)(record));
        }
        Ok(pairs)
    }

    /// Projection list of a record type
    pub fn columns<R: Record>() -> RepositoryResult<Vec<&'static str>> {
        Ok(Self::validated_fields::<R>()?
            .iter()
            .map(|f| f.column)
            .collect())
    }

    /// Build a record from a result row.
    ///
    /// Columns the record does not map are ignored; a mapped column that is
    /// absent from the row, or holds a value of the wrong type, is a scan error.
    pub fn hydrate<R: Record>(row: &Row, op: Operation, table: &str) -> RepositoryResult<R> {
        let fields = Self::validated_fields::<R>()?;

        let mut record = R::default();
        for field in fields {
            let value = row.get(field.column).ok_or_else(|| RepositoryError::Scan {
                op,
                table: table.to_string(),
                message: format!("missing column \"{}\" for {}", field.column, R::NAME),
            })?;
            (field.set)(&mut record, value.clone()).map_err(|e| RepositoryError::Scan {
                op,
                table: table.to_string(),
                message: format!("column \"{}\": {}", field.column, e),
            })?;
        }
        Ok(record)
    }

    fn validated_fields<R: Record>() -> RepositoryResult<&'static [Field<R>]> {
        let fields = R::fields();
        if fields.is_empty() {
            return Err(RepositoryError::InvalidRecordType {
                record: R::NAME,
                reason: "no mapped fields".to_string(),
            });
        }
        for (i, field) in fields.iter().enumerate() {
            if field.column.is_empty() {
                return Err(RepositoryError::InvalidRecordType {
                    record: R::NAME,
                    reason: format!("field #{} has an empty column name", i),
                });
            }
            if fields[..i].iter().any(|f| f.column == field.column) {
                return Err(RepositoryError::InvalidRecordType {
                    record: R::NAME,
                    reason: format!("column \"{}\" is mapped twice", field.column),
                });
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Note {
        id: Option<i64>,
        title: String,
        score: Option<f64>,
        // not mapped
        cached: bool,
    }

    impl Record for Note {
        const NAME: &'static str = "Note";

        fn fields() -> &'static [Field<Self>] {
            static FIELDS: &[Field<Note>] = record_fields!(Note {
                id => "id",
                title => "title",
                score => "score",
            });
            FIELDS
        }
    }

    #[derive(Debug, Default)]
    struct Nothing;

    impl Record for Nothing {
        const NAME: &'static str = "Nothing";

        fn fields() -> &'static [Field<Self>] {
            &[]
        }
    }

    #[derive(Debug, Default)]
    struct Twice {
        a: i64,
        b: i64,
    }

    impl Record for Twice {
        const NAME: &'static str = "Twice";

        fn fields() -> &'static [Field<Self>] {
            static FIELDS: &[Field<Twice>] = record_fields!(Twice { a => "a", b => "a" });
            FIELDS
        }
    }

    fn note() -> Note {
        Note {
            id: Some(1),
            title: "hello".to_string(),
            score: None,
            cached: true,
        }
    }

    #[test]
    fn test_extract_is_positional_and_stable() {
        let first = ColumnMapper::extract(&note()).unwrap();
        let second = ColumnMapper::extract(&note()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.columns(), &["id", "title", "score"]);
        assert_eq!(
            first.values(),
            &[SqlValue::Int(1), SqlValue::Text("hello".to_string()), SqlValue::Null]
        );
        assert_eq!(first.columns().len(), first.values().len());
    }

    #[test]
    fn test_without_nulls_keeps_order() {
        let pairs = ColumnMapper::extract(&note()).unwrap().without_nulls();
        let (columns, values) = pairs.into_parts();
        assert_eq!(columns, vec!["id", "title"]);
        assert_eq!(values, vec![SqlValue::Int(1), SqlValue::Text("hello".to_string())]);
    }

    #[test]
    fn test_record_without_fields_is_rejected() {
        let err = ColumnMapper::extract(&Nothing).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRecordType { record: "Nothing", .. }));
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let err = ColumnMapper::columns::<Twice>().unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRecordType { record: "Twice", .. }));
    }

    #[test]
    fn test_hydrate_ignores_unmapped_columns() {
        let row = Row::new()
            .with("id", 5i64)
            .with("title", "x")
            .with("score", 2.5)
            .with("status", true);

        let note: Note = ColumnMapper::hydrate(&row, Operation::FindOne, "notes").unwrap();
        assert_eq!(note.id, Some(5));
        assert_eq!(note.title, "x");
        assert_eq!(note.score, Some(2.5));
        assert!(!note.cached);
    }

    #[test]
    fn test_hydrate_missing_column() {
        let row = Row::new().with("id", 5i64);
        let err = ColumnMapper::hydrate::<Note>(&row, Operation::Find, "notes").unwrap_err();
        match err {
            RepositoryError::Scan { table, message, .. } => {
                assert_eq!(table, "notes");
                assert!(message.contains("title"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hydrate_wrong_type() {
        let row = Row::new().with("id", "nope").with("title", "x").with("score", SqlValue::Null);
        let err = ColumnMapper::hydrate::<Note>(&row, Operation::Find, "notes").unwrap_err();
        assert!(matches!(err, RepositoryError::Scan { .. }));
    }

    #[test]
    fn test_hydrate_skips_undecodable_extra_columns() {
        let row = Row::new()
            .with("id", 5i64)
            .with("title", "x")
            .with("score", SqlValue::Null)
            .with("rating", SqlValue::Unsupported("NUMERIC".to_string()));
        let note: Note = ColumnMapper::hydrate(&row, Operation::FindAll, "notes").unwrap();
        assert_eq!(note.title, "x");

        let row = Row::new()
            .with("id", 5i64)
            .with("title", "x")
            .with("score", SqlValue::Unsupported("NUMERIC".to_string()));
        let err = ColumnMapper::hydrate::<Note>(&row, Operation::FindAll, "notes").unwrap_err();
        match err {
            RepositoryError::Scan { message, .. } => {
                assert!(message.contains("score"));
                assert!(message.contains("unsupported"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
