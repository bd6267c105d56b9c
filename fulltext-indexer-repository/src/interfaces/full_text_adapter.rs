//! Text-ranking engine adapter trait definition.
//!
//! This module defines the abstract interface to the engine that stores and
//! ranks indexed documents. How text is tokenized and scored is the
//! engine's business; the indexer only sends documents and interprets hits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SearchError;
use fulltext_indexer_shared::{
    ClassRef, DocRef, DocumentQuery, IndexedDoc, SearchOptions, SearchQuery, SearchResult,
    TenantKey,
};

/// Abstract interface for a tenant's text engine.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, SearchError>` for consistent error handling.
#[async_trait]
pub trait FullTextAdapter: Send + Sync {
    /// Find indexed documents matching a flattened find-query.
    ///
    /// # Arguments
    ///
    /// * `classes` - Candidate classes; hits of any other class are excluded
    /// * `query` - `$search` clause plus constraints on indexed fields
    /// * `limit` - Maximum number of hits to return
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<IndexedDoc>)` - Hits with their relevance scores
    /// * `Err(SearchError)` - If the search fails
    async fn search(
        &self,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, SearchError>;

    /// Keyword search returning display-ready results.
    ///
    /// # Arguments
    ///
    /// * `query` - Query text and optional class/space restrictions
    /// * `options` - Result limit
    async fn search_string(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, SearchError>;

    /// Insert or replace documents in the index.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every document was indexed
    /// * `Err(SearchError::BulkIndexError)` - If any document failed to index
    async fn update_many(&self, docs: &[IndexedDoc]) -> Result<(), SearchError>;

    /// Remove documents from the index. Missing documents are not an error.
    async fn remove(&self, ids: &[DocRef]) -> Result<(), SearchError>;

    /// Ensure the tenant's index exists.
    ///
    /// This should be called once, right after the adapter is created.
    async fn init(&self) -> Result<(), SearchError>;

    /// Release the adapter. Later calls fail with `SearchError::Closed`.
    async fn close(&self) -> Result<(), SearchError>;
}

/// Opens one text-engine adapter per tenant.
#[async_trait]
pub trait FullTextAdapterFactory: Send + Sync {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<dyn FullTextAdapter>, SearchError>;
}
