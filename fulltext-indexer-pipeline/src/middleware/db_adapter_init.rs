//! Initialises the storage adapter before the pipeline serves requests.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{creator, Middleware, MiddlewareCreator, Next, PipelineContext};
use crate::errors::PipelineError;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, SearchOptions, SearchQuery, SearchResult,
    Tx,
};

/// Runs `init` on the storage adapter exactly once, when the layer is
/// created; afterwards every call passes through.
pub struct DbAdapterInitMiddleware {
    next: Next,
}

impl DbAdapterInitMiddleware {
    pub fn creator() -> Arc<dyn MiddlewareCreator> {
        creator(|context: Arc<PipelineContext>, next: Next| async move {
            context.storage()?.init().await?;
            debug!(tenant = %context.tenant, "Storage adapter initialised");
            Ok::<_, PipelineError>(Arc::new(Self { next }) as Arc<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for DbAdapterInitMiddleware {
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        self.next.provide_find_all(class, query, options).await
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
