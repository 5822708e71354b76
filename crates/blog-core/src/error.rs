//! Core error types for the blog backend

use thiserror::Error;

/// Error type returned by domain services
#[derive(Error, Debug)]
pub enum BlogError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl BlogError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BlogError::NotFound { .. } => "not_found",
            BlogError::Database(_) => "database_error",
        }
    }
}

/// Standard Result type for service operations
pub type BlogResult<T> = Result<T, BlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = BlogError::not_found("Author", "id", 42);
        assert_eq!(err.to_string(), "Not found: Author with id=42");
        assert_eq!(err.error_code(), "not_found");
    }
}
