//! Innermost layer: the tenant's structured storage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{creator, Middleware, MiddlewareCreator, Next, PipelineContext};
use crate::errors::PipelineError;
use fulltext_indexer_repository::StorageAdapter;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, SearchOptions, SearchQuery, SearchResult,
    Tx,
};

/// Opens the tenant's storage adapter and serves finds and transactions
/// from it. The adapter is published on the context for the layers above.
pub struct DbAdapterMiddleware {
    context: Arc<PipelineContext>,
    adapter: Arc<dyn StorageAdapter>,
    next: Next,
}

impl DbAdapterMiddleware {
    pub fn creator() -> Arc<dyn MiddlewareCreator> {
        creator(|context: Arc<PipelineContext>, next: Next| async move {
            let adapter = context
                .storage_factory()?
                .create(&context.tenant, &context.db_url, context.hierarchy.clone())
                .await?;
            context.set_storage(adapter.clone())?;
            info!(tenant = %context.tenant, db_url = %context.db_url, "Opened storage adapter");
            Ok::<_, PipelineError>(Arc::new(Self {
                context,
                adapter,
                next,
            }) as Arc<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for DbAdapterMiddleware {
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        let Some(domain) = self.context.hierarchy.find_domain(class) else {
            debug!(class = %class, "Class has no storage domain");
            return Ok(FindResult::empty());
        };
        Ok(self.adapter.find_all(domain, class, query, options).await?)
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        self.adapter.tx(txes).await?;
        self.next.provide_tx(txes).await
    }

    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        self.next.provide_search_fulltext(query, options).await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.adapter.close().await?;
        debug!(tenant = %self.context.tenant, "Closed storage adapter");
        Ok(())
    }
}
