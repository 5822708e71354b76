//! # blog-core
//!
//! Core types shared by every crate of the blog backend:
//! - the service error type and result alias
//! - the primary key alias
//! - environment configuration loading

pub mod config;
pub mod error;

pub use error::*;

/// Primary key type of every blog table
pub type Id = uuid::Uuid;
