//! The document pipeline contract.
//!
//! A pipeline is a chain of [`Middleware`] layers. Each layer is built by a
//! [`MiddlewareCreator`] that receives the shared [`PipelineContext`] and
//! the already-built remainder of the chain, so a layer may answer a call
//! itself or hand it to its successor through [`Next`].

mod context_name;
mod db_adapter;
mod db_adapter_init;
mod domain_find;
mod low_level;

use std::future::Future;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use fulltext_indexer_repository::{StorageAdapter, StorageAdapterFactory};
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, Hierarchy, ModelDb, SearchOptions,
    SearchQuery, SearchResult, TenantKey, Tx,
};

pub use context_name::ContextNameMiddleware;
pub use db_adapter::DbAdapterMiddleware;
pub use db_adapter_init::DbAdapterInitMiddleware;
pub use domain_find::DomainFindMiddleware;
pub use low_level::LowLevelMiddleware;

/// A layer of the document pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Find documents of `class` matching `query`.
    ///
    /// # Arguments
    ///
    /// * `class` - Requested class; documents of derived classes match too
    /// * `query` - Field constraints, optionally with a `$search` clause
    /// * `options` - Sort and limit
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError>;

    /// Apply a batch of transactions.
    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError>;

    /// Keyword search over the tenant's text index.
    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError>;

    /// Release the resources owned by this layer. Successors are closed by
    /// the [`Pipeline`], not by the layer.
    async fn close(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The successor of a middleware. The end of the chain answers every call
/// with an empty result.
#[derive(Clone, Default)]
pub struct Next(Option<Arc<dyn Middleware>>);

impl Next {
    pub fn new(next: Arc<dyn Middleware>) -> Self {
        Self(Some(next))
    }

    /// The end of the chain.
    pub fn end() -> Self {
        Self(None)
    }

    pub fn is_end(&self) -> bool {
        self.0.is_none()
    }

    pub async fn provide_find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        match &self.0 {
            Some(next) => next.find_all(class, query, options).await,
            None => Ok(FindResult::empty()),
        }
    }

    pub async fn provide_tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        match &self.0 {
            Some(next) => next.tx(txes).await,
            None => Ok(()),
        }
    }

    pub async fn provide_search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        match &self.0 {
            Some(next) => next.search_fulltext(query, options).await,
            None => Ok(SearchResult::empty()),
        }
    }
}

/// State shared by every layer of one tenant's pipeline.
pub struct PipelineContext {
    pub tenant: TenantKey,
    pub hierarchy: Arc<Hierarchy>,
    pub model: Arc<ModelDb>,
    /// Storage location of the tenant's documents.
    pub db_url: String,
    storage_factory: Option<Arc<dyn StorageAdapterFactory>>,
    storage: OnceLock<Arc<dyn StorageAdapter>>,
    low_level: OnceLock<Arc<dyn StorageAdapter>>,
}

impl PipelineContext {
    /// A context without structured storage, for pipelines that only
    /// decorate a chain owned by someone else.
    pub fn new(tenant: TenantKey, hierarchy: Arc<Hierarchy>, model: Arc<ModelDb>) -> Self {
        Self {
            tenant,
            hierarchy,
            model,
            db_url: String::new(),
            storage_factory: None,
            storage: OnceLock::new(),
            low_level: OnceLock::new(),
        }
    }

    /// Attach the storage configuration used by [`DbAdapterMiddleware`].
    pub fn with_storage(
        mut self,
        db_url: impl Into<String>,
        factory: Arc<dyn StorageAdapterFactory>,
    ) -> Self {
        self.db_url = db_url.into();
        self.storage_factory = Some(factory);
        self
    }

    pub fn storage_factory(&self) -> Result<&Arc<dyn StorageAdapterFactory>, PipelineError> {
        self.storage_factory
            .as_ref()
            .ok_or_else(|| PipelineError::middleware("no storage configured for the pipeline"))
    }

    /// The storage adapter opened by [`DbAdapterMiddleware`].
    pub fn storage(&self) -> Result<&Arc<dyn StorageAdapter>, PipelineError> {
        self.storage
            .get()
            .ok_or_else(|| PipelineError::middleware("storage adapter is not created yet"))
    }

    pub(crate) fn set_storage(&self, adapter: Arc<dyn StorageAdapter>) -> Result<(), PipelineError> {
        self.storage
            .set(adapter)
            .map_err(|_| PipelineError::middleware("storage adapter already created"))
    }

    /// Direct storage access bypassing the pipeline, published by
    /// [`LowLevelMiddleware`].
    pub fn low_level(&self) -> Option<&Arc<dyn StorageAdapter>> {
        self.low_level.get()
    }

    pub(crate) fn set_low_level(&self, adapter: Arc<dyn StorageAdapter>) -> Result<(), PipelineError> {
        self.low_level
            .set(adapter)
            .map_err(|_| PipelineError::middleware("low-level storage already published"))
    }
}

/// Builds one layer of a pipeline.
#[async_trait]
pub trait MiddlewareCreator: Send + Sync {
    /// # Arguments
    ///
    /// * `context` - State shared by the whole pipeline
    /// * `next` - The already-built remainder of the chain
    async fn create(
        &self,
        context: Arc<PipelineContext>,
        next: Next,
    ) -> Result<Arc<dyn Middleware>, PipelineError>;
}

struct FnCreator<F>(F);

#[async_trait]
impl<F> MiddlewareCreator for FnCreator<F>
where
    F: Fn(Arc<PipelineContext>, Next) -> BoxFuture<'static, Result<Arc<dyn Middleware>, PipelineError>>
        + Send
        + Sync,
{
    async fn create(
        &self,
        context: Arc<PipelineContext>,
        next: Next,
    ) -> Result<Arc<dyn Middleware>, PipelineError> {
        (self.0)(context, next).await
    }
}

/// Turn an async constructor into a [`MiddlewareCreator`].
pub fn creator<F, Fut>(create: F) -> Arc<dyn MiddlewareCreator>
where
    F: Fn(Arc<PipelineContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn Middleware>, PipelineError>> + Send + 'static,
{
    Arc::new(FnCreator(
        move |ctx: Arc<PipelineContext>,
              next: Next|
              -> BoxFuture<'static, Result<Arc<dyn Middleware>, PipelineError>> {
            Box::pin(create(ctx, next))
        },
    ))
}

/// A built chain of middleware.
pub struct Pipeline {
    context: Arc<PipelineContext>,
    /// Outermost first.
    layers: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    fn head(&self) -> Next {
        self.layers.first().cloned().map(Next::new).unwrap_or_default()
    }
}

/// Build a pipeline from creators listed outermost first.
///
/// Creators run innermost first, so every layer is created with its
/// successor already in place.
pub async fn create_pipeline(
    context: Arc<PipelineContext>,
    creators: &[Arc<dyn MiddlewareCreator>],
) -> Result<Pipeline, PipelineError> {
    let mut layers: Vec<Arc<dyn Middleware>> = Vec::with_capacity(creators.len());
    let mut next = Next::end();
    for creator in creators.iter().rev() {
        match creator.create(context.clone(), next.clone()).await {
            Ok(layer) => {
                next = Next::new(layer.clone());
                layers.push(layer);
            }
            Err(e) => {
                // Release the layers already built.
                for layer in layers.iter().rev() {
                    if let Err(close_err) = layer.close().await {
                        warn!(error = %close_err, "Failed to close middleware after setup error");
                    }
                }
                return Err(e);
            }
        }
    }
    layers.reverse();
    debug!(tenant = %context.tenant, layers = layers.len(), "Pipeline created");
    Ok(Pipeline { context, layers })
}

#[async_trait]
impl Middleware for Pipeline {
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        self.head().provide_find_all(class, query, options).await
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        self.head().provide_tx(txes).await
    }

    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        self.head().provide_search_fulltext(query, options).await
    }

    /// Close every layer, outermost first. All layers are closed even when
    /// one fails; the first error is returned.
    async fn close(&self) -> Result<(), PipelineError> {
        let mut result = Ok(());
        for layer in &self.layers {
            if let Err(e) = layer.close().await {
                warn!(tenant = %self.context.tenant, error = %e, "Failed to close middleware");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use fulltext_indexer_shared::classes;
    use fulltext_indexer_shared::hierarchy::builders::{attribute, class};

    pub const ISSUE: &str = "tracker:class:Issue";
    pub const NOTE: &str = "notes:class:Note";

    pub fn hierarchy() -> Arc<Hierarchy> {
        let mut h = Hierarchy::new();
        for tx in [
            class(classes::DOC, None, None),
            class(ISSUE, Some(classes::DOC), Some("tracker")),
            class(NOTE, Some(classes::DOC), None),
            attribute(ISSUE, "title", "core:class:TypeString", Some("FullText")),
        ] {
            h.tx(&tx).unwrap();
        }
        Arc::new(h)
    }

    pub fn context() -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::new(TenantKey::new("w1"), hierarchy(), Arc::new(ModelDb::new())).with_storage(
                "memory://",
                Arc::new(fulltext_indexer_repository::MemoryStorageFactory::new()),
            ),
        )
    }
}
