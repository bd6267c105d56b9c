//! Tenant full-text index.
//!
//! Bundles the text engine, the content extractor and the staged indexing
//! pipeline that feeds them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::errors::PipelineError;
use crate::indexing::{
    DocumentProcessor, IndexLoader, IndexingConfig, IndexingNotifier, IndexingPipeline,
};
use crate::middleware::Middleware;
use fulltext_indexer_repository::{ContentAdapter, FullTextAdapter};
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FullTextSearchContext, Hierarchy, IndexedDoc, SearchOptions,
    SearchQuery, SearchResult, TenantKey, Tx,
};

/// Full-text index of one tenant.
pub struct FullTextIndex {
    tenant: TenantKey,
    adapter: Arc<dyn FullTextAdapter>,
    content: Arc<dyn ContentAdapter>,
    indexing: IndexingPipeline,
}

impl FullTextIndex {
    /// Start the indexing worker and return the index.
    ///
    /// # Arguments
    ///
    /// * `reader` - Pipeline used to load current documents for updates
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: TenantKey,
        hierarchy: Arc<Hierarchy>,
        contexts: HashMap<ClassRef, FullTextSearchContext>,
        adapter: Arc<dyn FullTextAdapter>,
        content: Arc<dyn ContentAdapter>,
        reader: Arc<dyn Middleware>,
        notifier: Arc<dyn IndexingNotifier>,
        config: &IndexingConfig,
    ) -> Self {
        let processor =
            DocumentProcessor::new(hierarchy, contexts, content.clone()).with_reader(reader);
        let loader = IndexLoader::with_config(adapter.clone(), config.loader.clone());
        let indexing = IndexingPipeline::start(tenant.clone(), processor, loader, notifier, config);

        Self {
            tenant,
            adapter,
            content,
            indexing,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn FullTextAdapter> {
        &self.adapter
    }

    pub fn content(&self) -> &Arc<dyn ContentAdapter> {
        &self.content
    }

    /// Raw hits for a structured query.
    #[instrument(skip(self, query), fields(tenant = %self.tenant))]
    pub async fn search(
        &self,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, PipelineError> {
        Ok(self.adapter.search(classes, query, limit).await?)
    }

    /// Keyword search returning ranked titles.
    #[instrument(skip(self, query, options), fields(tenant = %self.tenant))]
    pub async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        Ok(self.adapter.search_string(query, options).await?)
    }

    /// Queue transactions for indexing without waiting for them to land.
    pub async fn submit(&self, txes: Vec<Tx>) -> Result<(), PipelineError> {
        self.indexing.submit(txes).await
    }

    /// Drain the indexing queue, then release the adapters.
    pub async fn close(&self) -> Result<(), PipelineError> {
        let mut first_error = None;

        if let Err(e) = self.indexing.close().await {
            warn!(tenant = %self.tenant, error = %e, "Failed to stop indexing pipeline");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.adapter.close().await {
            warn!(tenant = %self.tenant, error = %e, "Failed to close text adapter");
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = self.content.close().await {
            warn!(tenant = %self.tenant, error = %e, "Failed to close content adapter");
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
