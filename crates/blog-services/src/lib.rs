//! # blog-services
//!
//! Domain services for the blog backend, written against the
//! [`blog_db::CrudStore`] capability so that any repository variant (or a
//! test double) can back them.

pub mod authors;
pub mod error;

pub use authors::AuthorService;
pub use error::repository_error;
