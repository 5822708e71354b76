//! Author service

use blog_core::{BlogError, BlogResult, Id};
use blog_db::{CrudStore, Filter, QueryContext, SetMap, SqlValue, ID_COLUMN};
use blog_models::Author;

use crate::error::repository_error;

const ENTITY: &str = "Author";

/// CRUD use cases for authors over any author store
pub struct AuthorService<S> {
    store: S,
}

impl<S: CrudStore<Author>> AuthorService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert an author and return the id the database assigned
    pub async fn create(&self, ctx: &QueryContext, author: &Author) -> BlogResult<Id> {
        let mut id = SqlValue::Null;
        self.store
            .insert(ctx, author, Some(&mut id))
            .await
            .map_err(repository_error)?;

        let id = id
            .as_uuid()
            .ok_or_else(|| BlogError::Database(format!("insert returned a non-uuid id: {:?}", id)))?;
        tracing::info!(%id, "author created");
        Ok(id)
    }

    /// Every author, unpaginated
    pub async fn get_all(&self, ctx: &QueryContext) -> BlogResult<Vec<Author>> {
        self.store.find_all(ctx).await.map_err(repository_error)
    }

    pub async fn get_by_id(&self, ctx: &QueryContext, id: Id) -> BlogResult<Author> {
        let mut found = self
            .store
            .find(ctx, &by_id(id))
            .await
            .map_err(repository_error)?;
        if found.is_empty() {
            return Err(BlogError::not_found(ENTITY, ID_COLUMN, id));
        }
        Ok(found.swap_remove(0))
    }

    /// Apply `set` to one author and return the updated record
    pub async fn update_by_id(&self, ctx: &QueryContext, id: Id, set: &SetMap) -> BlogResult<Author> {
        let affected = self
            .store
            .update(ctx, set, &by_id(id))
            .await
            .map_err(repository_error)?;
        if affected == 0 {
            return Err(BlogError::not_found(ENTITY, ID_COLUMN, id));
        }
        self.get_by_id(ctx, id).await
    }

    /// Soft-delete one author
    pub async fn delete_by_id(&self, ctx: &QueryContext, id: Id) -> BlogResult<()> {
        let affected = self
            .store
            .remove(ctx, &by_id(id), false)
            .await
            .map_err(repository_error)?;
        if affected == 0 {
            return Err(BlogError::not_found(ENTITY, ID_COLUMN, id));
        }
        tracing::info!(%id, "author deleted");
        Ok(())
    }
}

fn by_id(id: Id) -> Filter {
    Filter::eq(ID_COLUMN, id)
}
