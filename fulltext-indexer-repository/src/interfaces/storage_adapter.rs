//! Structured storage adapter trait definition.
//!
//! The structured store is the authoritative source of documents; the text
//! index only ever narrows what is read from it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::SearchError;
use fulltext_indexer_shared::{ClassRef, DocumentQuery, FindOptions, FindResult, Hierarchy, TenantKey, Tx};

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Prepare the adapter for use (connections, schema).
    async fn init(&self) -> Result<(), SearchError>;

    /// Find documents of `class` (and of classes derived from it) stored in `domain`.
    ///
    /// # Arguments
    ///
    /// * `domain` - Storage domain of `class`
    /// * `class` - Requested class
    /// * `query` - Field constraints
    /// * `options` - Sort and limit
    ///
    /// # Returns
    ///
    /// * `Ok(FindResult)` - Matching rows, limited, with the unlimited total
    /// * `Err(SearchError)` - If the read fails
    async fn find_all(
        &self,
        domain: &str,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, SearchError>;

    /// Apply document transactions.
    async fn tx(&self, txes: &[Tx]) -> Result<(), SearchError>;

    /// Release the adapter.
    async fn close(&self) -> Result<(), SearchError>;
}

/// Creates a tenant's storage adapter from its storage configuration.
#[async_trait]
pub trait StorageAdapterFactory: Send + Sync {
    /// # Arguments
    ///
    /// * `tenant` - Tenant whose data the adapter serves
    /// * `db_url` - Storage location, as configured for the tenant
    /// * `hierarchy` - The tenant's class hierarchy
    async fn create(
        &self,
        tenant: &TenantKey,
        db_url: &str,
        hierarchy: Arc<Hierarchy>,
    ) -> Result<Arc<dyn StorageAdapter>, SearchError>;
}
