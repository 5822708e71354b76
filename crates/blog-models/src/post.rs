//! Post model
//!
//! Table: posts

use blog_core::Id;
use blog_db::{record_fields, Field, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author_id: Option<i64>,
    /// Ids of the tags attached to the post (integer array column)
    pub tags_id: Option<Vec<i64>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Post {
    const NAME: &'static str = "Post";

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: &[Field<Post>] = record_fields!(Post {
            id => "id",
            title => "title",
            content => "content",
            author_id => "author_id",
            tags_id => "tags_id",
            created_at => "created_at",
            updated_at => "updated_at",
        });
        FIELDS
    }
}

impl Post {
    pub const TABLE: &'static str = "posts";

    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tagged(mut self, tags: impl IntoIterator<Item = i64>) -> Self {
        self.tags_id = Some(tags.into_iter().collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use blog_db::{ColumnMapper, Operation, Row, SqlValue};
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_tags_map_to_int_array() {
        let post = Post::new("Hello", "World").tagged([1, 2, 3]);
        let pairs = ColumnMapper::extract(&post).unwrap();

        assert_eq!(pairs.len(), 7);
        assert_eq!(pairs.columns()[4], "tags_id");
        assert_eq!(pairs.values()[4], SqlValue::IntArray(vec![1, 2, 3]));
    }

    #[test]
    fn test_insert_omits_unset_columns() {
        let pairs = ColumnMapper::extract(&Post::new("Hello", "World"))
            .unwrap()
            .without_nulls();
        assert_eq!(pairs.columns(), &["title", "content"]);
    }

    #[test]
    fn test_hydrate_timestamps() {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let row = Row::new()
            .with("id", SqlValue::Null)
            .with("title", "Hello")
            .with("content", "World")
            .with("author_id", 7i64)
            .with("tags_id", vec![1i64])
            .with("created_at", created)
            .with("updated_at", SqlValue::Null);

        let post: Post = ColumnMapper::hydrate(&row, Operation::Find, Post::TABLE).unwrap();
        assert_eq!(post.author_id, Some(7));
        assert_eq!(post.created_at, Some(created));
        assert_eq!(post.updated_at, None);
    }

    #[test]
    fn test_hydrate_rejects_wrong_type() {
        let row = Row::new()
            .with("id", SqlValue::Null)
            .with("title", 1i64)
            .with("content", "World")
            .with("author_id", SqlValue::Null)
            .with("tags_id", SqlValue::Null)
            .with("created_at", SqlValue::Null)
            .with("updated_at", SqlValue::Null);

        let err = ColumnMapper::hydrate::<Post>(&row, Operation::Find, Post::TABLE).unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
