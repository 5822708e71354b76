//! Author model
//!
//! Table: authors

use blog_core::Id;
use blog_db::{record_fields, Field, Record};
use serde::{Deserialize, Serialize};

/// Blog author
///
/// Every column is optional so that a partially filled record can be
/// inserted; unset columns fall back to database defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Option<Id>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub score: Option<f64>,
}

impl Record for Author {
    const NAME: &'static str = "Author";

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: &[Field<Author>] = record_fields!(Author {
            id => "id",
            first_name => "first_name",
            last_name => "last_name",
            score => "score",
        });
        FIELDS
    }
}

impl Author {
    pub const TABLE: &'static str = "authors";

    /// Create a new author without an id
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Default::default()
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// "First Last", skipping whichever part is unset
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
