//! Adapter error types.
//!
//! This module defines the errors that can occur while talking to the text
//! engine, the content extractors, or the structured store.

use thiserror::Error;

/// Errors that can occur during adapter operations.
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    /// Failed to establish connection to the backend.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Search query execution failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to index documents.
    #[error("Index error: {0}")]
    IndexError(String),

    /// Bulk indexing operation had failures.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to delete documents.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Failed to parse response from the backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Structured storage failure.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Content extraction failure.
    #[error("Content error: {0}")]
    ContentError(String),

    /// The adapter was used after `close`.
    #[error("Adapter closed")]
    Closed,
}

impl SearchError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a content error.
    pub fn content(msg: impl Into<String>) -> Self {
        Self::ContentError(msg.into())
    }

    /// Whether retrying the same operation may succeed (transient failures).
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::ConnectionError(_) | SearchError::ParseError(_) => true,
            SearchError::BulkIndexError(msg) | SearchError::IndexError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("rate limit")
                    || msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("503")
                    || msg_lower.contains("429")
            }
            SearchError::QueryError(_)
            | SearchError::DeleteError(_)
            | SearchError::IndexCreationError(_)
            | SearchError::SerializationError(_)
            | SearchError::StorageError(_)
            | SearchError::ContentError(_)
            | SearchError::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SearchError::connection("refused").is_retryable());
        assert!(SearchError::bulk_index("status 429 Too Many Requests").is_retryable());
        assert!(!SearchError::bulk_index("mapper_parsing_exception").is_retryable());
        assert!(!SearchError::Closed.is_retryable());
    }
}
