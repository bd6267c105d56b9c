//! Content extraction adapter trait definition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SearchError;
use fulltext_indexer_shared::TenantKey;

/// Extracts searchable text from attachment payloads.
#[async_trait]
pub trait ContentAdapter: Send + Sync {
    /// Extract text from `data`.
    ///
    /// # Arguments
    ///
    /// * `name` - File name of the payload
    /// * `content_type` - MIME type of the payload
    /// * `data` - Raw bytes
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Extracted text (empty when the type is not supported)
    /// * `Err(SearchError::ContentError)` - If extraction fails
    async fn content(&self, name: &str, content_type: &str, data: &[u8]) -> Result<String, SearchError>;

    /// Release the adapter.
    async fn close(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Opens one content adapter per tenant.
#[async_trait]
pub trait ContentAdapterFactory: Send + Sync {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<dyn ContentAdapter>, SearchError>;
}
