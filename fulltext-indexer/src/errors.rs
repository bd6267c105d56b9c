//! Error types for the indexer service.

use std::sync::Arc;

use thiserror::Error;

use fulltext_indexer_pipeline::PipelineError;
use fulltext_indexer_repository::SearchError;
use fulltext_indexer_shared::TokenError;

/// Errors that can occur while serving or building tenant indexers.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The request body does not match the endpoint schema.
    #[error("Request error: {0}")]
    RequestError(String),

    /// The token does not decode under the server secret.
    #[error("Token error: {0}")]
    TokenError(#[from] TokenError),

    /// A tenant indexer could not be built. Shared by every request that
    /// waited on the same construction.
    #[error("Construction error: {0}")]
    ConstructionError(Arc<IndexerError>),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// The pool no longer serves requests.
    #[error("Indexer pool is shut down")]
    ShutDown,

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::RequestError(msg.into())
    }
}
