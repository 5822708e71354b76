//! # blog-models
//!
//! Domain records for the blog backend.
//!
//! Each record implements [`blog_db::Record`] with a static column
//! registration, so any of them can be bound to a repository.

pub use blog_core::Id;

pub mod author;
pub mod post;
pub mod tag;

// Re-exports for convenience
pub use author::Author;
pub use post::Post;
pub use tag::Tag;
