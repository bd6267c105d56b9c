//! Domain-aware finds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{creator, Middleware, MiddlewareCreator, Next, PipelineContext};
use crate::errors::PipelineError;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, SearchOptions, SearchQuery, SearchResult,
    Tx,
};

/// Resolves the storage domain of the requested class and reads straight
/// from the storage adapter. Classes without a domain have no stored
/// documents and answer empty. Transactions pass through.
pub struct DomainFindMiddleware {
    context: Arc<PipelineContext>,
    next: Next,
}

impl DomainFindMiddleware {
    pub fn creator() -> Arc<dyn MiddlewareCreator> {
        creator(|context: Arc<PipelineContext>, next: Next| async move {
            // Fail at build time rather than on the first find.
            context.storage()?;
            Ok::<_, PipelineError>(Arc::new(Self { context, next }) as Arc<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for DomainFindMiddleware {
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
        let adapter = self.context.storage()?;
        Ok(adapter.find_all(domain, class, query, options).await?)
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        self.next.provide_tx(txes).await
    }

    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        self.next.provide_search_fulltext(query, options).await
    }
}
