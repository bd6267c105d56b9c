//! Error types for the document pipeline.

use thiserror::Error;

use fulltext_indexer_repository::SearchError;
use fulltext_indexer_shared::HierarchyError;

/// Errors that can occur in the document pipeline.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A middleware could not be created or failed.
    #[error("Middleware error: {0}")]
    MiddlewareError(String),

    /// Structured storage failure.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Text engine failure, or an unreachable indexer.
    #[error("Search error: {0}")]
    SearchError(String),

    /// The query cannot be executed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Error from the processor component.
    #[error("Processor error: {0}")]
    ProcessorError(String),

    /// Error from the loader component.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Model error.
    #[error("Hierarchy error: {0}")]
    HierarchyError(#[from] HierarchyError),

    /// The pipeline was used after `close`.
    #[error("Pipeline closed")]
    Closed,
}

impl PipelineError {
    /// Create a middleware error.
    pub fn middleware(msg: impl Into<String>) -> Self {
        Self::MiddlewareError(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Create a search error.
    pub fn search(msg: impl Into<String>) -> Self {
        Self::SearchError(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a processor error.
    pub fn processor(msg: impl Into<String>) -> Self {
        Self::ProcessorError(msg.into())
    }

    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }
}

impl From<SearchError> for PipelineError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Closed => Self::Closed,
            SearchError::StorageError(msg) => Self::StorageError(msg),
            SearchError::QueryError(msg) => Self::InvalidQuery(msg),
            other => Self::SearchError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_search_error() {
        assert!(matches!(PipelineError::from(SearchError::Closed), PipelineError::Closed));
        assert!(matches!(
            PipelineError::from(SearchError::storage("down")),
            PipelineError::StorageError(msg) if msg == "down"
        ));
        assert!(matches!(
            PipelineError::from(SearchError::connection("refused")),
            PipelineError::SearchError(_)
        ));
    }
}
