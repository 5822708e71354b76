//! Tag model
//!
//! Table: tags

use blog_core::Id;
use blog_db::{record_fields, Field, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Option<Id>,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Tag {
    const NAME: &'static str = "Tag";

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: &[Field<Tag>] = record_fields!(Tag {
            id => "id",
            name => "name",
            created_at => "created_at",
            updated_at => "updated_at",
        });
        FIELDS
    }
}

impl Tag {
    pub const TABLE: &'static str = "tags";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}
