//! Outermost layer: publishes direct storage access.

use std::sync::Arc;

use async_trait::async_trait;

use super::{creator, Middleware, MiddlewareCreator, Next, PipelineContext};
use crate::errors::PipelineError;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, SearchOptions, SearchQuery, SearchResult,
    Tx,
};

/// Publishes the storage adapter as [`PipelineContext::low_level`], for
/// collaborators that read documents by domain without going through the
/// chain. Calls on the layer itself pass through.
pub struct LowLevelMiddleware {
    next: Next,
}

impl LowLevelMiddleware {
    pub fn creator() -> Arc<dyn MiddlewareCreator> {
        creator(|context: Arc<PipelineContext>, next: Next| async move {
            let adapter = context.storage()?.clone();
            context.set_low_level(adapter)?;
            Ok::<_, PipelineError>(Arc::new(Self { next }) as Arc<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for LowLevelMiddleware {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::test_support::{context, ISSUE, NOTE};
    use crate::middleware::{
        create_pipeline, ContextNameMiddleware, DbAdapterInitMiddleware, DbAdapterMiddleware,
        DomainFindMiddleware,
    };
    use fulltext_indexer_shared::DocRef;
    use serde_json::Map;

    fn read_layers() -> Vec<Arc<dyn MiddlewareCreator>> {
        vec![
            LowLevelMiddleware::creator(),
            ContextNameMiddleware::creator(),
            DomainFindMiddleware::creator(),
            DbAdapterInitMiddleware::creator(),
            DbAdapterMiddleware::creator(),
        ]
    }

    #[tokio::test]
    async fn test_read_pipeline_serves_finds_and_txes() {
        let ctx = context();
        let pipeline = create_pipeline(ctx.clone(), &read_layers()).await.unwrap();
        assert!(ctx.low_level().is_some());

        pipeline
            .tx(&[Tx::create(ISSUE, "i1", "s1", Map::new())])
            .await
            .unwrap();
        let issue = ClassRef::new(ISSUE);
        let result = pipeline
            .find_all(&issue, &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![&DocRef::new("i1")]);

        let low_level = ctx.low_level().unwrap();
        let direct = low_level
            .find_all("tracker", &issue, &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(direct.total, 1);
    }

    #[tokio::test]
    async fn test_class_without_domain_is_empty() {
        let pipeline = create_pipeline(context(), &read_layers()).await.unwrap();
        let result = pipeline
            .find_all(&ClassRef::new(NOTE), &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_storage() {
        let ctx = context();
        let pipeline = create_pipeline(ctx.clone(), &read_layers()).await.unwrap();
        pipeline.close().await.unwrap();

        let result = pipeline
            .find_all(&ClassRef::new(ISSUE), &DocumentQuery::new(), &FindOptions::default())
            .await;
        assert!(matches!(result, Err(PipelineError::Closed)));
    }

    #[tokio::test]
    async fn test_layers_above_storage_require_it() {
        let result = create_pipeline(
            context(),
            &[LowLevelMiddleware::creator(), DomainFindMiddleware::creator()],
        )
        .await;
        assert!(matches!(result, Err(PipelineError::MiddlewareError(_))));
    }
}
