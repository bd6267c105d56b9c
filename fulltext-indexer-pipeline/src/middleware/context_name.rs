//! Names the tenant on every pipeline operation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info_span, Instrument};

use super::{creator, Middleware, MiddlewareCreator, Next, PipelineContext};
use crate::errors::PipelineError;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, SearchOptions, SearchQuery, SearchResult,
    Tx,
};

/// Runs every call of the layers below inside a span carrying the tenant
/// key, so their log lines can be attributed.
pub struct ContextNameMiddleware {
    context: Arc<PipelineContext>,
    next: Next,
}

impl ContextNameMiddleware {
    pub fn creator() -> Arc<dyn MiddlewareCreator> {
        creator(|context: Arc<PipelineContext>, next: Next| async move {
            Ok(Arc::new(Self { context, next }) as Arc<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for ContextNameMiddleware {
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        let span = info_span!("find_all", tenant = %self.context.tenant, class = %class);
        self.next
            .provide_find_all(class, query, options)
            .instrument(span)
            .await
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        let span = info_span!("tx", tenant = %self.context.tenant, count = txes.len());
        self.next.provide_tx(txes).instrument(span).await
    }

    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        let span = info_span!("search_fulltext", tenant = %self.context.tenant);
        self.next
            .provide_search_fulltext(query, options)
            .instrument(span)
            .await
    }
}
